use crate::data::{image_to_tensor, load_image, TumorClass, NUM_CLASSES, SIDE_LENGTH};
use crate::error::ClassifierError;
use crate::model::TumorCnn;
use crate::train::{TrainingConfig, CONFIG_FILE};
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, ElementConversion};
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::activation::softmax;
use burn::tensor::Tensor;
use md5::{Digest, Md5};
use std::any::Any;
use std::fs::File;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Existence, size and MD5 of the model file, logged for traceability only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFileInfo {
	pub path: PathBuf,
	pub exists: bool,
	pub size: Option<u64>,
	pub md5_checksum: Option<String>,
}

impl ModelFileInfo {
	pub fn inspect<P: AsRef<Path>>(path: P) -> Result<Self, ClassifierError> {
		let path = path.as_ref();
		if !path.is_file() {
			return Ok(Self {
				path: path.to_path_buf(),
				exists: false,
				size: None,
				md5_checksum: None,
			});
		}

		let mut file = File::open(path)?;
		let mut hasher = Md5::new();
		let mut chunk = [0u8; 4096];
		let mut size = 0u64;
		loop {
			let read = file.read(&mut chunk)?;
			if read == 0 {
				break;
			}
			hasher.update(&chunk[..read]);
			size += read as u64;
		}

		Ok(Self {
			path: path.to_path_buf(),
			exists: true,
			size: Some(size),
			md5_checksum: Some(format!("{:x}", hasher.finalize())),
		})
	}

	fn log(&self) {
		log::info!("Model path: {}", self.path.display());
		if self.exists {
			log::info!("Model file found.");
		} else {
			log::error!("Model file not found.");
		}
		log::info!("Model Exists: {}", self.exists);
		log::info!("Model File Size: {} bytes", self.size.map_or("-".to_string(), |s| s.to_string()));
		log::info!("Model MD5 Checksum: {}", self.md5_checksum.as_deref().unwrap_or("-"));
	}
}

/// A loaded model ready to classify scans.
///
/// burn modules are `Send` but not `Sync`, so forward passes are serialized
/// through the mutex.
pub struct Classifier<B: Backend> {
	model: Mutex<TumorCnn<B>>,
	device: B::Device,
}

impl<B: Backend> Classifier<B> {
	pub fn load<P: AsRef<Path>>(path: P, device: B::Device) -> Result<Self, ClassifierError> {
		let path = path.as_ref();
		let info = ModelFileInfo::inspect(path)?;
		info.log();
		if !info.exists {
			return Err(ClassifierError::ModelUnavailable(format!("{} does not exist", path.display())));
		}

		let training = compile_config(path);

		let record = CompactRecorder::new()
			.load(path.to_path_buf(), &device)
			.map_err(|err| ClassifierError::ModelUnavailable(format!("{} could not be read: {err:?}", path.display())))?;
		let model = training.model.init::<B>(&device).load_record(record);

		let classifier = Self::from_model(model, device)?;
		log::info!("Model loaded successfully.");
		classifier.log_summary();

		Ok(classifier)
	}

	/// Wraps an in-memory model, checking that it accepts the input frame
	/// and yields one score per class.
	pub fn from_model(model: TumorCnn<B>, device: B::Device) -> Result<Self, ClassifierError> {
		let classifier = Self {
			model: Mutex::new(model),
			device,
		};

		let side = SIDE_LENGTH as usize;
		let probe = Tensor::<B, 4>::zeros([1, 3, side, side], &classifier.device);
		let dims = classifier
			.infer(probe)
			.map_err(|err| ClassifierError::ModelUnavailable(err.to_string()))?
			.dims();
		if dims != [1, NUM_CLASSES] {
			return Err(ClassifierError::ModelUnavailable(format!(
				"model yields {dims:?} scores, expected [1, {NUM_CLASSES}]"
			)));
		}

		Ok(classifier)
	}

	pub fn predict<P: AsRef<Path>>(&self, image_path: P) -> Result<TumorClass, ClassifierError> {
		let image_path = image_path.as_ref();
		let image = load_image(image_path)?;
		let input = image_to_tensor::<B>(image, &self.device).unsqueeze::<4>();

		let probabilities = self.infer(input)?;
		let index = probabilities.argmax(1).flatten::<1>(0, 1).into_scalar().elem::<i64>();
		let class = usize::try_from(index)
			.ok()
			.and_then(TumorClass::from_index)
			.ok_or_else(|| ClassifierError::Inference(format!("class index {index} out of range")))?;

		log::info!("Prediction for image {}: {}", image_path.display(), class.label());
		Ok(class)
	}

	fn infer(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 2>, ClassifierError> {
		let model = self
			.model
			.lock()
			.map_err(|_| ClassifierError::Inference("model lock poisoned".to_string()))?;

		// backends report shape mismatches by panicking
		panic::catch_unwind(AssertUnwindSafe(|| softmax(model.forward(input), 1)))
			.map_err(|payload| ClassifierError::Inference(panic_message(payload)))
	}

	fn log_summary(&self) {
		let Ok(model) = self.model.lock() else {
			return;
		};

		log::info!("Model Summary:");
		log::info!("{:<6} {:<8} {:<18} {:>8}", "Layer", "Type", "Weight shape", "Params");
		for layer in model.summary() {
			log::info!("{layer}");
		}
		log::info!("Total params: {}", model.num_params());
	}
}

/// Restores the optimizer and loss setup the model was trained with, falling
/// back to the standard one. Inference never uses the optimizer.
fn compile_config(model_path: &Path) -> TrainingConfig {
	let config_path = model_path.with_file_name(CONFIG_FILE);
	let config = match TrainingConfig::load(&config_path) {
		Ok(config) => config,
		Err(err) => {
			log::debug!("No training config at {}: {err:?}", config_path.display());
			TrainingConfig::standard()
		}
	};

	log::info!(
		"Compiled with Adam optimizer (learning rate {}) and categorical cross-entropy loss",
		config.learning_rate
	);
	config
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		message.to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"backend panicked".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::TumorCnnConfig;
	use burn::backend::NdArray;
	use image::{GrayImage, Luma, Rgb, RgbImage};
	use tempfile::TempDir;

	type TestBackend = NdArray;

	fn saved_model(dir: &Path) -> PathBuf {
		let path = dir.join("brain_tumor_cnn_classifier.mpk");
		TumorCnnConfig::new()
			.init::<TestBackend>(&Default::default())
			.save_file(path.clone(), &CompactRecorder::new())
			.unwrap();
		path
	}

	#[test]
	fn md5_matches_reference_digest() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("model.bin");
		std::fs::write(&path, b"The quick brown fox jumps over the lazy dog").unwrap();

		let info = ModelFileInfo::inspect(&path).unwrap();
		assert!(info.exists);
		assert_eq!(info.size, Some(43));
		assert_eq!(info.md5_checksum.as_deref(), Some("9e107d9d372bb6826bd81d3542a419d6"));
	}

	#[test]
	fn checksum_spans_multiple_chunks() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("model.bin");
		std::fs::write(&path, vec![7u8; 10_000]).unwrap();

		let info = ModelFileInfo::inspect(&path).unwrap();
		assert_eq!(info.size, Some(10_000));

		let mut hasher = Md5::new();
		hasher.update(vec![7u8; 10_000]);
		assert_eq!(info.md5_checksum, Some(format!("{:x}", hasher.finalize())));
	}

	#[test]
	fn missing_model_is_unavailable() {
		let dir = TempDir::new().unwrap();
		let info = ModelFileInfo::inspect(dir.path().join("absent.mpk")).unwrap();
		assert!(!info.exists);
		assert_eq!(info.md5_checksum, None);

		let result = Classifier::<TestBackend>::load(dir.path().join("absent.mpk"), Default::default());
		assert!(matches!(result, Err(ClassifierError::ModelUnavailable(_))));
	}

	#[test]
	fn garbage_model_file_is_unavailable() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("brain_tumor_cnn_classifier.mpk");
		std::fs::write(&path, b"not a record").unwrap();

		let result = Classifier::<TestBackend>::load(&path, Default::default());
		assert_eq!(result.err().map(|err| err.kind()), Some("model_unavailable"));
	}

	#[test]
	fn saved_model_predicts_a_known_label() {
		let dir = TempDir::new().unwrap();
		let classifier = Classifier::<TestBackend>::load(saved_model(dir.path()), Default::default()).unwrap();

		let rgb = dir.path().join("rgb.png");
		RgbImage::from_pixel(300, 250, Rgb([120, 30, 200])).save(&rgb).unwrap();
		let gray = dir.path().join("gray.png");
		GrayImage::from_pixel(512, 512, Luma([90])).save(&gray).unwrap();

		for path in [rgb, gray] {
			let class = classifier.predict(&path).unwrap();
			assert!(TumorClass::ALL.contains(&class));
		}
	}

	#[test]
	fn unreadable_image_is_reported_not_raised() {
		let dir = TempDir::new().unwrap();
		let classifier = Classifier::<TestBackend>::from_model(
			TumorCnnConfig::new().init(&Default::default()),
			Default::default(),
		)
		.unwrap();

		let err = classifier.predict(dir.path().join("missing.jpg")).unwrap_err();
		assert_eq!(err.kind(), "image_decode");
	}

	#[test]
	fn wrong_class_count_is_rejected() {
		let model = TumorCnnConfig::new()
			.with_num_classes(3)
			.init::<TestBackend>(&Default::default());

		let result = Classifier::from_model(model, Default::default());
		assert!(matches!(result, Err(ClassifierError::ModelUnavailable(_))));
	}
}
