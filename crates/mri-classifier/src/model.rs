use crate::data::{TumorBatch, NUM_CLASSES};
use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::backend::AutodiffBackend;
use burn::train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep};
use std::fmt;

#[derive(Debug, Module)]
pub struct TumorCnn<B: Backend> {
	activation: Relu,
	dropout: Dropout,
	pool: MaxPool2d,
	conv1: Conv2d<B>,
	conv2: Conv2d<B>,
	conv3: Conv2d<B>,
	global_pool: AdaptiveAvgPool2d,
	fc1: Linear<B>,
	fc2: Linear<B>,
}

impl<B: Backend> TumorCnn<B> {
	/// [N, 3, 224, 224] images to [N, NUM_CLASSES] logits.
	pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
		let x = self.conv1.forward(images);
		let x = self.activation.forward(x);
		let x = self.pool.forward(x); // [N, 16, 112, 112]

		let x = self.conv2.forward(x);
		let x = self.activation.forward(x);
		let x = self.pool.forward(x); // [N, 32, 56, 56]

		let x = self.conv3.forward(x);
		let x = self.activation.forward(x);
		let x = self.pool.forward(x); // [N, 64, 28, 28]

		let x = self.global_pool.forward(x);
		let x = x.flatten(1, 3);

		let x = self.fc1.forward(x);
		let x = self.activation.forward(x);
		let x = self.dropout.forward(x);

		self.fc2.forward(x)
	}

	pub fn forward_classification(&self, images: Tensor<B, 4>, targets: Tensor<B, 1, Int>) -> ClassificationOutput<B> {
		let output = self.forward(images);

		// categorical cross-entropy over the softmax of the logits
		let loss = CrossEntropyLossConfig::new()
			.init(&output.device())
			.forward(output.clone(), targets.clone());

		ClassificationOutput::new(loss, output, targets)
	}

	/// Parameter shapes of every weighted layer, in forward order.
	pub fn summary(&self) -> Vec<LayerSummary> {
		vec![
			LayerSummary::of("conv1", "Conv2d", &self.conv1.weight, &self.conv1.bias),
			LayerSummary::of("conv2", "Conv2d", &self.conv2.weight, &self.conv2.bias),
			LayerSummary::of("conv3", "Conv2d", &self.conv3.weight, &self.conv3.bias),
			LayerSummary::of("fc1", "Linear", &self.fc1.weight, &self.fc1.bias),
			LayerSummary::of("fc2", "Linear", &self.fc2.weight, &self.fc2.bias),
		]
	}
}

impl<B: AutodiffBackend> TrainStep<TumorBatch<B>, ClassificationOutput<B>> for TumorCnn<B> {
	fn step(&self, batch: TumorBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
		let item = self.forward_classification(batch.images, batch.targets);

		TrainOutput::new(self, item.loss.backward(), item)
	}
}

impl<B: Backend> ValidStep<TumorBatch<B>, ClassificationOutput<B>> for TumorCnn<B> {
	fn step(&self, batch: TumorBatch<B>) -> ClassificationOutput<B> {
		self.forward_classification(batch.images, batch.targets)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
	pub name: &'static str,
	pub kind: &'static str,
	pub weight_shape: Vec<usize>,
	pub params: usize,
}

impl LayerSummary {
	fn of<B: Backend, const D: usize>(
		name: &'static str,
		kind: &'static str,
		weight: &Param<Tensor<B, D>>,
		bias: &Option<Param<Tensor<B, 1>>>,
	) -> Self {
		let weight_shape = weight.val().dims().to_vec();
		let bias_len = bias.as_ref().map(|b| b.val().dims()[0]).unwrap_or(0);

		Self {
			name,
			kind,
			params: weight_shape.iter().product::<usize>() + bias_len,
			weight_shape,
		}
	}
}

impl fmt::Display for LayerSummary {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:<6} {:<8} {:<18} {:>8}", self.name, self.kind, format!("{:?}", self.weight_shape), self.params)
	}
}

#[derive(Debug, Config)]
pub struct TumorCnnConfig {
	#[config(default = "NUM_CLASSES")]
	pub num_classes: usize,
	#[config(default = 0.3)]
	dropout: f64,
	#[config(default = 128)]
	hidden_size: usize,
}

impl TumorCnnConfig {
	pub fn init<B: Backend>(&self, device: &B::Device) -> TumorCnn<B> {
		let conv1 = Conv2dConfig::new([3, 16], [3, 3])
			.with_padding(PaddingConfig2d::Same)
			.init(device);

		let conv2 = Conv2dConfig::new([16, 32], [3, 3])
			.with_padding(PaddingConfig2d::Same)
			.init(device);

		let conv3 = Conv2dConfig::new([32, 64], [3, 3])
			.with_padding(PaddingConfig2d::Same)
			.init(device);

		let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
		let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();

		let fc1 = LinearConfig::new(64, self.hidden_size).init(device);
		let fc2 = LinearConfig::new(self.hidden_size, self.num_classes).init(device);

		TumorCnn {
			activation: Relu::new(),
			dropout: DropoutConfig::new(self.dropout).init(),
			pool,
			conv1,
			conv2,
			conv3,
			global_pool,
			fc1,
			fc2,
		}
	}
}
