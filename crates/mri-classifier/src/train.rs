use crate::data::{CorpusDataset, TumorBatcher};
use crate::model::TumorCnnConfig;
use burn::config::Config;
use burn::data::dataloader::DataLoaderBuilder;
use burn::data::dataset::Dataset;
use burn::module::Module;
use burn::optim::AdamConfig;
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use burn::train::metric::{AccuracyMetric, CpuUse, LossMetric};
use burn::train::LearnerBuilder;
use std::path::Path;
use std::time::Instant;

/// Name of the training config written next to the model record.
pub const CONFIG_FILE: &str = "config.json";

#[derive(Config)]
pub struct TrainingConfig {
	pub model: TumorCnnConfig,
	pub optimizer: AdamConfig,
	#[config(default = 20)]
	pub num_epochs: usize,
	#[config(default = 32)]
	pub batch_size: usize,
	#[config(default = 4)]
	pub num_workers: usize,
	#[config(default = 42)]
	pub seed: u64,
	#[config(default = 1.0e-3)]
	pub learning_rate: f64,
	#[config(default = 0.8)]
	pub train_ratio: f64,
}

impl TrainingConfig {
	/// Adam at 1e-3 with categorical cross-entropy, the setup the served model is compiled with.
	pub fn standard() -> Self {
		Self::new(TumorCnnConfig::new(), AdamConfig::new())
	}
}

fn create_artifact_dir(artifact_dir: &str) {
	// Remove existing artifacts before to get an accurate learner summary
	std::fs::remove_dir_all(artifact_dir).ok();
	std::fs::create_dir_all(artifact_dir).ok();
}

pub fn train_run<B: AutodiffBackend>(
	config: &TrainingConfig,
	corpus_dir: &Path,
	model_path: &Path,
	device: B::Device,
) -> anyhow::Result<()> {
	let artifact_dir = model_path.parent().unwrap_or_else(|| Path::new("."));
	let checkpoint_dir = format!("{}/training", artifact_dir.display());
	create_artifact_dir(&checkpoint_dir);

	B::seed(config.seed);

	let dataset = CorpusDataset::from(corpus_dir)?.shuffled(config.seed);
	let (train_dataset, valid_dataset) = dataset.split(config.train_ratio);

	log::info!("Train Dataset Size: {}", train_dataset.len());
	log::info!("Valid Dataset Size: {}", valid_dataset.len());

	let batcher_train = TumorBatcher::<B>::new(device.clone());
	let batcher_valid = TumorBatcher::<B::InnerBackend>::new(device.clone());

	let dataloader_train = DataLoaderBuilder::new(batcher_train)
		.batch_size(config.batch_size)
		.shuffle(config.seed)
		.num_workers(config.num_workers)
		.build(train_dataset);

	let dataloader_valid = DataLoaderBuilder::new(batcher_valid)
		.batch_size(config.batch_size)
		.num_workers(config.num_workers)
		.build(valid_dataset);

	let learner = LearnerBuilder::new(&checkpoint_dir)
		.metric_train_numeric(AccuracyMetric::new())
		.metric_valid_numeric(AccuracyMetric::new())
		.metric_train_numeric(LossMetric::new())
		.metric_valid_numeric(LossMetric::new())
		.metric_train(CpuUse::new())
		.with_file_checkpointer(CompactRecorder::new())
		.devices(vec![device.clone()])
		.num_epochs(config.num_epochs)
		.summary()
		.build(
			config.model.init::<B>(&device),
			config.optimizer.init(),
			config.learning_rate,
		);

	let now = Instant::now();
	let model_trained = learner.fit(dataloader_train, dataloader_valid);
	let elapsed = now.elapsed().as_secs();
	log::info!("Training completed in {}m{}s", elapsed / 60, elapsed % 60);

	config.save(artifact_dir.join(CONFIG_FILE))?;

	model_trained
		.save_file(model_path.to_path_buf(), &CompactRecorder::new())
		.map_err(|err| anyhow::anyhow!("could not save trained model: {err:?}"))?;
	log::info!("Model written to {}", model_path.display());

	Ok(())
}
