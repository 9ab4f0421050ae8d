use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Serialize, Deserialize};
use std::f64::consts::PI;
use std::ops::{Add, Sub};

use crate::error::{Error, Result};

/// Dense row-major n-dimensional array.
///
/// Image batches use NHWC order: `[batch, height, width, channels]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor::filled(shape, 0.0)
    }

    pub fn filled(shape: &[usize], value: f64) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![value; shape.iter().product()],
        }
    }

    /// Wraps `data` with `shape`, failing if the element counts differ.
    pub fn from_vec(shape: &[usize], data: Vec<f64>) -> Result<Tensor> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::config(format!(
                "shape {:?} needs {} values, got {}",
                shape, expected, data.len()
            )));
        }
        Ok(Tensor { shape: shape.to_vec(), data })
    }

    /// Samples a single value from N(0, 1) using the Box-Muller transform.
    fn sample_standard_normal(rng: &mut StdRng) -> f64 {
        // Both uniforms in (0, 1] to avoid log(0).
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = 1.0 - rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    fn normal(shape: &[usize], std_dev: f64, rng: &mut StdRng) -> Tensor {
        let n = shape.iter().product();
        let data = (0..n)
            .map(|_| Tensor::sample_standard_normal(rng) * std_dev)
            .collect();
        Tensor { shape: shape.to_vec(), data }
    }

    /// He initialization: samples from N(0, sqrt(2 / fan_in)).
    ///
    /// Recommended before ReLU layers. The variance 2/fan_in accounts for
    /// the fact that ReLU zeroes half of its inputs on average.
    pub fn he(shape: &[usize], fan_in: usize, rng: &mut StdRng) -> Tensor {
        Tensor::normal(shape, (2.0 / fan_in as f64).sqrt(), rng)
    }

    /// Xavier (Glorot) initialization: samples from N(0, sqrt(1 / fan_in)).
    pub fn xavier(shape: &[usize], fan_in: usize, rng: &mut StdRng) -> Tensor {
        Tensor::normal(shape, (1.0 / fan_in as f64).sqrt(), rng)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Size of the leading (batch) dimension.
    pub fn batch_size(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Shape without the leading batch dimension.
    pub fn sample_shape(&self) -> &[usize] {
        if self.shape.is_empty() { &self.shape } else { &self.shape[1..] }
    }

    /// Number of elements in one sample (product of the non-batch dims).
    pub fn sample_len(&self) -> usize {
        self.sample_shape().iter().product()
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f64) -> f64,
    {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    /// Element-wise combination of two same-shape tensors.
    pub fn zip_map<F>(&self, other: &Tensor, functor: F) -> Tensor
    where
        F: Fn(f64, f64) -> f64,
    {
        assert_eq!(self.shape, other.shape, "zip_map on tensors of different shapes");
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().zip(other.data.iter()).map(|(&a, &b)| functor(a, b)).collect(),
        }
    }

    pub fn reshape(self, shape: &[usize]) -> Result<Tensor> {
        Tensor::from_vec(shape, self.data)
    }

    /// Inserts a dimension of size 1 at `axis`.
    pub fn expand_dims(mut self, axis: usize) -> Tensor {
        self.shape.insert(axis.min(self.shape.len()), 1);
        self
    }

    /// Copies samples `start..end` of the batch dimension.
    pub fn slice_batch(&self, start: usize, end: usize) -> Tensor {
        let per = self.sample_len();
        let mut shape = self.shape.clone();
        shape[0] = end - start;
        Tensor { shape, data: self.data[start * per..end * per].to_vec() }
    }

    /// Gathers the listed samples (in order) into a new batch.
    pub fn gather_batch(&self, indices: &[usize]) -> Tensor {
        let per = self.sample_len();
        let mut shape = self.shape.clone();
        shape[0] = indices.len();
        let mut data = Vec::with_capacity(indices.len() * per);
        for &i in indices {
            data.extend_from_slice(&self.data[i * per..(i + 1) * per]);
        }
        Tensor { shape, data }
    }

    /// Stacks batches that share a sample shape along the batch dimension.
    pub fn concat_batch(parts: &[Tensor]) -> Result<Tensor> {
        let first = parts.first().ok_or_else(|| Error::config("nothing to concatenate"))?;
        let sample_shape = first.sample_shape().to_vec();
        let mut data = Vec::new();
        let mut n = 0;
        for part in parts {
            if part.sample_shape() != sample_shape.as_slice() {
                return Err(Error::config(format!(
                    "cannot concatenate sample shapes {:?} and {:?}",
                    sample_shape, part.sample_shape()
                )));
            }
            n += part.batch_size();
            data.extend_from_slice(&part.data);
        }
        let mut shape = vec![n];
        shape.extend(sample_shape);
        Ok(Tensor { shape, data })
    }

    /// Row-wise argmax of a `[n, k]` tensor.
    pub fn argmax_rows(&self) -> Vec<usize> {
        let k = self.sample_len().max(1);
        self.data.chunks(k).map(argmax).collect()
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }
}

/// Index of the maximum element in a slice (first one on ties).
pub fn argmax(v: &[f64]) -> usize {
    let mut best = 0;
    for (i, &x) in v.iter().enumerate() {
        if x > v[best] {
            best = i;
        }
    }
    best
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor { shape: vec![0], data: vec![] }
    }
}

impl Add for Tensor {
    type Output = Tensor;

    fn add(self, rhs: Self) -> Self::Output {
        if self.shape != rhs.shape {
            panic!("Tensors are of incorrect shapes")
        }
        self.zip_map(&rhs, |a, b| a + b)
    }
}

impl Sub for Tensor {
    type Output = Tensor;

    fn sub(self, rhs: Self) -> Self::Output {
        if self.shape != rhs.shape {
            panic!("Tensors are of incorrect shapes")
        }
        self.zip_map(&rhs, |a, b| a - b)
    }
}
