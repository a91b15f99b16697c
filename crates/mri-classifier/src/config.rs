use burn::config::Config;
use log::LevelFilter;
use std::path::{Path, PathBuf};

/// Where the service finds its model and corpus, and where it listens.
#[derive(Debug, Config)]
pub struct ServiceConfig {
	#[config(default = "String::from(\"models/brain_tumor_cnn_classifier.mpk\")")]
	pub model_path: String,
	#[config(default = "String::from(\"mri-images\")")]
	pub corpus_dir: String,
	#[config(default = "String::from(\"127.0.0.1:5000\")")]
	pub bind_address: String,
	/// Route the corpus is mounted under for the browser.
	#[config(default = "String::from(\"/static\")")]
	pub static_route: String,
	#[config(default = false)]
	pub debug: bool,
}

impl ServiceConfig {
	/// Built-in defaults, or the JSON file at `path` when one is given.
	pub fn from_file(path: Option<&str>) -> anyhow::Result<Self> {
		match path {
			Some(path) => Self::load(path)
				.map_err(|err| anyhow::anyhow!("could not load config {path}: {err:?}")),
			None => Ok(Self::new()),
		}
	}

	/// Directory holding the model record and its training config.
	pub fn artifact_dir(&self) -> PathBuf {
		Path::new(&self.model_path)
			.parent()
			.map(Path::to_path_buf)
			.unwrap_or_default()
	}

	pub fn log_level(&self) -> LevelFilter {
		if self.debug {
			LevelFilter::Debug
		} else {
			LevelFilter::Info
		}
	}
}
