use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// Images and their one-hot labels, always the same count.
///
/// `images` is `[N, ..sample_shape]`, `labels` is `[N, num_classes]`.
/// The fields are read-only outside this module so the invariants checked
/// by `new` cannot be broken afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    images: Tensor,
    labels: Tensor,
}

impl Batch {
    /// Validates that every label row is one-hot and that image and label
    /// counts agree.
    pub fn new(images: Tensor, labels: Tensor) -> Result<Batch> {
        if images.rank() < 2 {
            return Err(Error::config(format!(
                "images must be [batch, ..sample], got {:?}",
                images.shape
            )));
        }
        if labels.rank() != 2 {
            return Err(Error::config(format!(
                "labels must be [batch, classes], got {:?}",
                labels.shape
            )));
        }
        if images.batch_size() != labels.batch_size() {
            return Err(Error::config(format!(
                "{} images but {} labels",
                images.batch_size(),
                labels.batch_size()
            )));
        }
        let width = labels.sample_len();
        for (i, row) in labels.data.chunks(width.max(1)).enumerate() {
            let ones = row.iter().filter(|&&v| v == 1.0).count();
            let zeros = row.iter().filter(|&&v| v == 0.0).count();
            if ones != 1 || ones + zeros != row.len() {
                return Err(Error::config(format!("label row {} is not one-hot: {:?}", i, row)));
            }
        }
        Ok(Batch { images, labels })
    }

    /// Builds a batch from class indices.
    pub fn from_classes(images: Tensor, classes: &[u8], num_classes: usize) -> Result<Batch> {
        Batch::new(images, one_hot(classes, num_classes)?)
    }

    pub fn images(&self) -> &Tensor {
        &self.images
    }

    pub fn labels(&self) -> &Tensor {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.images.batch_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_classes(&self) -> usize {
        self.labels.sample_len()
    }

    /// Class index of every sample.
    pub fn classes(&self) -> Vec<usize> {
        self.labels.argmax_rows()
    }

    /// Samples `start..end`, in order.
    pub fn slice(&self, start: usize, end: usize) -> Batch {
        Batch {
            images: self.images.slice_batch(start, end),
            labels: self.labels.slice_batch(start, end),
        }
    }

    /// The listed samples, in the listed order.
    pub fn gather(&self, indices: &[usize]) -> Batch {
        Batch {
            images: self.images.gather_batch(indices),
            labels: self.labels.gather_batch(indices),
        }
    }

    pub fn into_parts(self) -> (Tensor, Tensor) {
        (self.images, self.labels)
    }
}

/// `[n, num_classes]` one-hot encoding of `classes`.
pub fn one_hot(classes: &[u8], num_classes: usize) -> Result<Tensor> {
    let mut data = vec![0.0; classes.len() * num_classes];
    for (i, &c) in classes.iter().enumerate() {
        let c = c as usize;
        if c >= num_classes {
            return Err(Error::config(format!(
                "class {} is out of range for {} classes",
                c, num_classes
            )));
        }
        data[i * num_classes + c] = 1.0;
    }
    Tensor::from_vec(&[classes.len(), num_classes], data)
}
