use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::data::batch::Batch;
use crate::data::idx::{parse_images, parse_labels};
use crate::error::{Error, Result};
use crate::network::spec::NUM_CLASSES;

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

/// Raw MNIST files read from disk. Decoding into tensors happens in the
/// accessors so callers can ask for a prefix of each split.
#[derive(Debug, Clone)]
pub struct MnistData {
    train_images: Vec<u8>,
    train_labels: Vec<u8>,
    test_images: Vec<u8>,
    test_labels: Vec<u8>,
}

fn read(dir: &Path, name: &str) -> Result<Vec<u8>> {
    let path: PathBuf = dir.join(name);
    fs::read(&path).map_err(|e| Error::load(format!("cannot read '{}': {}", path.display(), e)))
}

impl MnistData {
    /// Reads the four standard IDX files from `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<MnistData> {
        let dir = dir.as_ref();
        let data = MnistData {
            train_images: read(dir, TRAIN_IMAGES)?,
            train_labels: read(dir, TRAIN_LABELS)?,
            test_images: read(dir, TEST_IMAGES)?,
            test_labels: read(dir, TEST_LABELS)?,
        };
        // Validate headers now so a corrupt file fails at load time.
        data.train_data(Some(0))?;
        data.test_data(Some(0))?;
        info!("MNIST files loaded from {}", dir.display());
        Ok(data)
    }

    /// Builds an in-memory dataset from already-read IDX bytes.
    pub fn from_bytes(train_images: Vec<u8>, train_labels: Vec<u8>, test_images: Vec<u8>, test_labels: Vec<u8>) -> MnistData {
        MnistData { train_images, train_labels, test_images, test_labels }
    }

    /// The training split, truncated to `limit` samples when given.
    pub fn train_data(&self, limit: Option<usize>) -> Result<Batch> {
        decode(&self.train_images, &self.train_labels, limit)
    }

    /// The test split, truncated to `limit` samples when given.
    pub fn test_data(&self, limit: Option<usize>) -> Result<Batch> {
        decode(&self.test_images, &self.test_labels, limit)
    }
}

fn decode(images: &[u8], labels: &[u8], limit: Option<usize>) -> Result<Batch> {
    let images = parse_images(images, limit)?;
    let labels = parse_labels(labels, NUM_CLASSES, limit)?;
    if images.batch_size() != labels.len() {
        return Err(Error::load(format!(
            "IDX file mismatch: {} images but {} labels",
            images.batch_size(),
            labels.len()
        )));
    }
    Batch::from_classes(images, &labels, NUM_CLASSES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::idx::tests::{idx1, idx3};

    #[test]
    fn splits_decode_into_batches() {
        let data = MnistData::from_bytes(
            idx3(&[[0; 4], [255; 4], [9; 4]]),
            idx1(&[1, 2, 3]),
            idx3(&[[7; 4]]),
            idx1(&[7]),
        );
        let train = data.train_data(None).unwrap();
        assert_eq!(train.len(), 3);
        assert_eq!(train.classes(), vec![1, 2, 3]);
        assert_eq!(data.train_data(Some(2)).unwrap().len(), 2);
        assert_eq!(data.test_data(None).unwrap().classes(), vec![7]);
    }

    #[test]
    fn mismatched_counts_are_load_errors() {
        let data = MnistData::from_bytes(idx3(&[[0; 4], [0; 4]]), idx1(&[1]), idx3(&[]), idx1(&[]));
        assert!(matches!(data.train_data(None), Err(Error::Load(_))));
    }

    #[test]
    fn missing_directory_is_a_load_error() {
        assert!(matches!(MnistData::load("/nonexistent/mnist"), Err(Error::Load(_))));
    }
}
