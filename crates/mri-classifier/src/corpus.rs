use crate::data::TumorClass;
use crate::error::ClassifierError;
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use std::path::{Path, PathBuf};

/// A sample drawn from the corpus: the class it is filed under and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
	pub class: TumorClass,
	pub file_name: String,
	pub path: PathBuf,
}

/// Read-only tree of labelled sample scans, one directory per class.
#[derive(Debug, Clone)]
pub struct SampleCorpus {
	root: PathBuf,
}

impl SampleCorpus {
	pub fn new<P: Into<PathBuf>>(root: P) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn class_dir(&self, class: TumorClass) -> PathBuf {
		self.root.join(class.dir_name())
	}

	pub fn pick_random(&self) -> Result<Sample, ClassifierError> {
		self.pick_random_with(&mut thread_rng())
	}

	/// Uniform over classes, then uniform over the files of that class.
	/// The directory is listed on every call.
	pub fn pick_random_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Sample, ClassifierError> {
		let class = TumorClass::ALL[rng.gen_range(0..TumorClass::ALL.len())];
		let class_dir = self.class_dir(class);

		let images = list_images(&class_dir)?;
		let path = images
			.choose(rng)
			.cloned()
			.ok_or_else(|| ClassifierError::CorpusEmpty(class_dir.clone()))?;

		let file_name = path
			.file_name()
			.map(|name| name.to_string_lossy().into_owned())
			.unwrap_or_default();

		Ok(Sample { class, file_name, path })
	}
}

/// Regular files directly inside `dir`, sorted by name.
pub(crate) fn list_images<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>, ClassifierError> {
	let dir = dir.as_ref();
	let unreadable = |source| ClassifierError::CorpusUnreadable {
		path: dir.to_path_buf(),
		source,
	};

	let mut images = Vec::new();
	for entry in dir.read_dir().map_err(unreadable)? {
		let entry = entry.map_err(unreadable)?;
		if entry.file_type().map_err(unreadable)?.is_file() {
			images.push(entry.path());
		}
	}
	images.sort();

	Ok(images)
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::rngs::StdRng;
	use rand::SeedableRng;
	use tempfile::TempDir;

	fn corpus_with(files_per_class: usize) -> (TempDir, SampleCorpus) {
		let dir = TempDir::new().unwrap();
		for class in TumorClass::ALL {
			let class_dir = dir.path().join(class.dir_name());
			std::fs::create_dir(&class_dir).unwrap();
			for i in 0..files_per_class {
				std::fs::write(class_dir.join(format!("img{i}.jpg")), b"jpg").unwrap();
			}
		}
		let corpus = SampleCorpus::new(dir.path());
		(dir, corpus)
	}

	#[test]
	fn picks_existing_file_of_the_drawn_class() {
		let (_dir, corpus) = corpus_with(3);
		let mut rng = StdRng::seed_from_u64(7);

		for _ in 0..50 {
			let sample = corpus.pick_random_with(&mut rng).unwrap();
			assert!(TumorClass::ALL.contains(&sample.class));
			assert!(sample.path.exists());
			assert_eq!(sample.path.parent().unwrap(), corpus.class_dir(sample.class));
			assert_eq!(sample.path.file_name().unwrap().to_str().unwrap(), sample.file_name);
		}
	}

	#[test]
	fn every_class_is_eventually_drawn() {
		let (_dir, corpus) = corpus_with(1);
		let mut rng = StdRng::seed_from_u64(1);

		let mut seen = std::collections::HashSet::new();
		for _ in 0..200 {
			seen.insert(corpus.pick_random_with(&mut rng).unwrap().class);
		}
		assert_eq!(seen.len(), TumorClass::ALL.len());
	}

	#[test]
	fn listing_is_not_cached() {
		let (dir, corpus) = corpus_with(0);
		assert!(corpus.pick_random().is_err());

		for class in TumorClass::ALL {
			std::fs::write(dir.path().join(class.dir_name()).join("late.png"), b"png").unwrap();
		}

		let sample = corpus.pick_random().unwrap();
		assert_eq!(sample.file_name, "late.png");
	}

	#[test]
	fn empty_class_directory_is_reported() {
		let (_dir, corpus) = corpus_with(0);
		let err = corpus.pick_random().unwrap_err();
		assert!(matches!(err, ClassifierError::CorpusEmpty(_)));
	}

	#[test]
	fn missing_corpus_is_unreadable() {
		let dir = TempDir::new().unwrap();
		let corpus = SampleCorpus::new(dir.path().join("nowhere"));
		let err = corpus.pick_random().unwrap_err();
		assert_eq!(err.kind(), "corpus_unreadable");
	}

	#[test]
	fn subdirectories_are_not_samples() {
		let (dir, _corpus) = corpus_with(2);
		let glioma = dir.path().join("glioma");
		std::fs::create_dir(glioma.join("nested")).unwrap();

		let images = list_images(&glioma).unwrap();
		assert_eq!(images.len(), 2);
		assert!(images.iter().all(|p| p.is_file()));
	}
}
