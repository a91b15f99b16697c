use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
	#[error("Model unavailable: {0}")]
	ModelUnavailable(String),
	#[error("Could not decode image {path:?}")]
	ImageDecode {
		path: PathBuf,
		#[source]
		source: image::ImageError,
	},
	#[error("Corpus directory {0:?} contains no images")]
	CorpusEmpty(PathBuf),
	#[error("Corpus directory {path:?} could not be read")]
	CorpusUnreadable {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("Inference failed: {0}")]
	Inference(String),
	#[error("Std IO error")]
	StdIoError(#[from] std::io::Error),
}

impl ClassifierError {
	/// Stable tag used in log lines so failure modes can be told apart.
	pub fn kind(&self) -> &'static str {
		match self {
			ClassifierError::ModelUnavailable(_) => "model_unavailable",
			ClassifierError::ImageDecode { .. } => "image_decode",
			ClassifierError::CorpusEmpty(_) => "corpus_empty",
			ClassifierError::CorpusUnreadable { .. } => "corpus_unreadable",
			ClassifierError::Inference(_) => "inference",
			ClassifierError::StdIoError(_) => "io",
		}
	}
}
