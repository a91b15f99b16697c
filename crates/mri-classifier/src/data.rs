use crate::corpus::list_images;
use crate::error::ClassifierError;
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::{Backend, ElementConversion, Int};
use burn::tensor::{Tensor, TensorData};
use image::imageops::FilterType;
use image::{ImageError, ImageReader, RgbImage};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Images are fed to the network as SIDE_LENGTH x SIDE_LENGTH RGB frames.
pub const SIDE_LENGTH: u32 = 224;
pub const NUM_CLASSES: usize = 4;

/// The four diagnostic classes, in the order of the model's output vector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TumorClass {
	Glioma,
	Meningioma,
	NoTumor,
	Pituitary,
}

impl TumorClass {
	pub const ALL: [TumorClass; NUM_CLASSES] = [
		TumorClass::Glioma,
		TumorClass::Meningioma,
		TumorClass::NoTumor,
		TumorClass::Pituitary,
	];

	pub fn index(self) -> usize {
		self as usize
	}

	pub fn from_index(index: usize) -> Option<Self> {
		Self::ALL.get(index).copied()
	}

	/// Name of the class directory inside the sample corpus.
	pub fn dir_name(self) -> &'static str {
		match self {
			TumorClass::Glioma => "glioma",
			TumorClass::Meningioma => "meningioma",
			TumorClass::NoTumor => "notumor",
			TumorClass::Pituitary => "pituitary",
		}
	}

	/// Human readable label returned as the prediction.
	pub fn label(self) -> &'static str {
		match self {
			TumorClass::Glioma => "glioma",
			TumorClass::Meningioma => "meningioma",
			TumorClass::NoTumor => "no tumor",
			TumorClass::Pituitary => "pituitary",
		}
	}

	pub fn from_dir_name(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|class| class.dir_name() == name)
	}
}

/// Decodes an image and brings it to the network's input frame.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbImage, ClassifierError> {
	let path = path.as_ref();
	let decode_error = |source| ClassifierError::ImageDecode {
		path: path.to_path_buf(),
		source,
	};

	// the format is sniffed from the content, the extension is only a hint
	let image = ImageReader::open(path)
		.and_then(|reader| reader.with_guessed_format())
		.map_err(|err| decode_error(ImageError::IoError(err)))?
		.decode()
		.map_err(decode_error)?;

	// Grayscale scans are expanded to three channels after resizing
	let image = image.resize_exact(SIDE_LENGTH, SIDE_LENGTH, FilterType::Triangle);
	Ok(image.into_rgb8())
}

/// [H, W, 3] bytes to a [3, H, W] float tensor in [0, 1].
pub fn image_to_tensor<B: Backend>(image: RgbImage, device: &B::Device) -> Tensor<B, 3> {
	let (width, height) = image.dimensions();
	let pixels: Vec<f32> = image.into_raw().into_iter().map(|x| (x as f32) / 255.0).collect();
	let data = TensorData::new(pixels, [height as usize, width as usize, 3]);

	Tensor::<B, 3>::from_data(data.convert::<B::FloatElem>(), device).permute([2, 0, 1])
}

/// Reads only the header, so files that could never be batched are left out of the dataset.
fn has_image_header(path: &Path) -> bool {
	let header = ImageReader::open(path)
		.and_then(|reader| reader.with_guessed_format())
		.map_err(ImageError::IoError)
		.and_then(|reader| reader.into_dimensions());

	match header {
		Ok(_) => true,
		Err(err) => {
			log::warn!("Leaving {:?} out of the dataset: {}", path, err);
			false
		}
	}
}

#[derive(Debug, Clone)]
pub struct CorpusItem {
	pub path: PathBuf,
	pub class: TumorClass,
}

/// Every labelled image of the corpus, used for training.
pub struct CorpusDataset {
	items: Vec<CorpusItem>,
}

impl CorpusDataset {
	pub fn from<A: AsRef<Path>>(corpus_dir: A) -> Result<Self, ClassifierError> {
		let corpus_dir = corpus_dir.as_ref();

		let per_class = TumorClass::ALL[..]
			.par_iter()
			.map(|class| {
				let images = list_images(corpus_dir.join(class.dir_name()))?;
				Ok(images
					.into_iter()
					.filter(|path| has_image_header(path))
					.map(|path| CorpusItem { path, class: *class })
					.collect::<Vec<_>>())
			})
			.collect::<Result<Vec<_>, ClassifierError>>()?;

		Ok(Self {
			items: per_class.into_iter().flatten().collect(),
		})
	}

	pub fn shuffled(mut self, seed: u64) -> Self {
		self.items.shuffle(&mut StdRng::seed_from_u64(seed));
		self
	}

	/// Splits into (train, valid) keeping `train_ratio` of the items for training.
	pub fn split(mut self, train_ratio: f64) -> (Self, Self) {
		let cut = ((self.items.len() as f64) * train_ratio).round() as usize;
		let valid = self.items.split_off(cut.min(self.items.len()));

		(self, Self { items: valid })
	}
}

impl Dataset<CorpusItem> for CorpusDataset {
	fn get(&self, index: usize) -> Option<CorpusItem> {
		self.items.get(index).cloned()
	}

	fn len(&self) -> usize {
		self.items.len()
	}
}

#[derive(Clone)]
pub struct TumorBatcher<B: Backend> {
	device: B::Device,
}

impl<B: Backend> TumorBatcher<B> {
	pub fn new(device: B::Device) -> Self {
		Self { device }
	}
}

#[derive(Debug, Clone)]
pub struct TumorBatch<B: Backend> {
	pub images: Tensor<B, 4>,
	pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<CorpusItem, TumorBatch<B>> for TumorBatcher<B> {
	fn batch(&self, items: Vec<CorpusItem>) -> TumorBatch<B> {
		let decoded: Vec<(RgbImage, TumorClass)> = items
			.par_iter()
			.filter_map(|item| match load_image(&item.path) {
				Ok(image) => Some((image, item.class)),
				Err(err) => {
					log::warn!("Skipping {:?}: {}", item.path, err);
					None
				}
			})
			.collect();

		if decoded.is_empty() {
			log::warn!("No image of the batch could be decoded");
			let side = SIDE_LENGTH as usize;
			return TumorBatch {
				images: Tensor::empty([0, 3, side, side], &self.device),
				targets: Tensor::empty([0], &self.device),
			};
		}

		let (images, targets): (Vec<_>, Vec<_>) = decoded
			.into_iter()
			.map(|(image, class)| {
				let image = image_to_tensor::<B>(image, &self.device);
				let target = Tensor::<B, 1, Int>::from_data(
					TensorData::from([(class.index() as i64).elem::<B::IntElem>()]),
					&self.device,
				);
				(image, target)
			})
			.unzip();

		TumorBatch {
			images: Tensor::stack(images, 0),
			targets: Tensor::cat(targets, 0),
		}
	}
}
