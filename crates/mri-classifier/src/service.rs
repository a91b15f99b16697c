use crate::corpus::SampleCorpus;
use crate::data::TumorClass;
use crate::error::ClassifierError;
use crate::infer::Classifier;
use burn::prelude::Backend;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Answer to one random-sample request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionResult {
	pub image_path: String,
	pub actual_label: String,
	pub predicted_label: Option<String>,
}

/// Composes the sample picker and the classifier. Without a classifier the
/// service is unready: samples are still served, predictions are not.
pub struct PredictionService<B: Backend> {
	classifier: Option<Classifier<B>>,
	corpus: SampleCorpus,
	static_route: String,
}

impl<B: Backend> PredictionService<B> {
	pub fn new(classifier: Option<Classifier<B>>, corpus: SampleCorpus, static_route: impl Into<String>) -> Self {
		Self {
			classifier,
			corpus,
			static_route: static_route.into(),
		}
	}

	pub fn is_ready(&self) -> bool {
		self.classifier.is_some()
	}

	pub fn corpus(&self) -> &SampleCorpus {
		&self.corpus
	}

	pub fn static_route(&self) -> &str {
		&self.static_route
	}

	pub fn predict<P: AsRef<Path>>(&self, image_path: P) -> Result<TumorClass, ClassifierError> {
		self.classifier
			.as_ref()
			.ok_or_else(|| ClassifierError::ModelUnavailable("no model was loaded at startup".to_string()))?
			.predict(image_path)
	}

	/// Any failure is logged and becomes `None`; callers must not retry on it.
	pub fn predict_label<P: AsRef<Path>>(&self, image_path: P) -> Option<TumorClass> {
		match self.predict(image_path) {
			Ok(class) => Some(class),
			Err(err) => {
				log::error!("Error in prediction ({}): {}", err.kind(), err);
				None
			}
		}
	}

	pub fn random_prediction(&self) -> Result<PredictionResult, ClassifierError> {
		let sample = self.corpus.pick_random()?;
		let predicted = self.predict_label(&sample.path);
		log::info!("Random image selected: {}", sample.path.display());

		Ok(PredictionResult {
			image_path: format!(
				"{}/{}/{}",
				self.static_route.trim_end_matches('/'),
				sample.class.dir_name(),
				urlencoding::encode(&sample.file_name)
			),
			actual_label: sample.class.dir_name().to_string(),
			predicted_label: predicted.map(|class| class.label().to_string()),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::TumorCnnConfig;
	use burn::backend::NdArray;
	use image::{Rgb, RgbImage};
	use tempfile::TempDir;

	type TestBackend = NdArray;

	fn png_corpus() -> TempDir {
		let dir = TempDir::new().unwrap();
		for class in TumorClass::ALL {
			let class_dir = dir.path().join(class.dir_name());
			std::fs::create_dir(&class_dir).unwrap();
			RgbImage::from_pixel(64, 64, Rgb([class.index() as u8 * 60, 10, 10]))
				.save(class_dir.join("img1.png"))
				.unwrap();
		}
		dir
	}

	fn classifier() -> Classifier<TestBackend> {
		Classifier::from_model(TumorCnnConfig::new().init(&Default::default()), Default::default()).unwrap()
	}

	#[test]
	fn unready_service_serves_samples_without_prediction() {
		let corpus = png_corpus();
		let service = PredictionService::<TestBackend>::new(None, SampleCorpus::new(corpus.path()), "/static");
		assert!(!service.is_ready());

		let result = service.random_prediction().unwrap();
		assert_eq!(result.predicted_label, None);
		assert!(TumorClass::from_dir_name(&result.actual_label).is_some());
		assert_eq!(result.image_path, format!("/static/{}/img1.png", result.actual_label));
	}

	#[test]
	fn unready_service_reports_model_unavailable() {
		let corpus = png_corpus();
		let service = PredictionService::<TestBackend>::new(None, SampleCorpus::new(corpus.path()), "/static");

		let err = service.predict(corpus.path().join("glioma/img1.png")).unwrap_err();
		assert_eq!(err.kind(), "model_unavailable");
	}

	#[test]
	fn ready_service_predicts_one_of_the_labels() {
		let corpus = png_corpus();
		let service = PredictionService::new(Some(classifier()), SampleCorpus::new(corpus.path()), "/static/");
		assert!(service.is_ready());

		let result = service.random_prediction().unwrap();
		let labels: Vec<_> = TumorClass::ALL.iter().map(|c| c.label()).collect();
		assert!(labels.contains(&result.predicted_label.as_deref().unwrap()));
		assert!(result.image_path.starts_with("/static/"));
		assert!(!result.image_path.starts_with("/static//"));
	}

	#[test]
	fn corrupt_sample_yields_null_prediction() {
		let corpus = TempDir::new().unwrap();
		for class in TumorClass::ALL {
			let class_dir = corpus.path().join(class.dir_name());
			std::fs::create_dir(&class_dir).unwrap();
			std::fs::write(class_dir.join("broken.jpg"), b"garbage").unwrap();
		}
		let service = PredictionService::new(Some(classifier()), SampleCorpus::new(corpus.path()), "/static");

		let result = service.random_prediction().unwrap();
		assert_eq!(result.predicted_label, None);
	}

	#[test]
	fn file_names_are_percent_encoded() {
		let corpus = TempDir::new().unwrap();
		for class in TumorClass::ALL {
			let class_dir = corpus.path().join(class.dir_name());
			std::fs::create_dir(&class_dir).unwrap();
			std::fs::write(class_dir.join("scan #1?.png"), b"png").unwrap();
		}
		let service = PredictionService::<TestBackend>::new(None, SampleCorpus::new(corpus.path()), "/static");

		let result = service.random_prediction().unwrap();
		assert_eq!(result.image_path, format!("/static/{}/scan%20%231%3F.png", result.actual_label));
	}

	#[test]
	fn empty_corpus_is_an_error() {
		let corpus = TempDir::new().unwrap();
		let service = PredictionService::<TestBackend>::new(None, SampleCorpus::new(corpus.path()), "/static");
		assert!(service.random_prediction().is_err());
	}
}
