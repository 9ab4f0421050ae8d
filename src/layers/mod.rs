pub mod conv2d;
pub mod pooling;
pub mod batch_norm;
pub mod dropout;
pub mod flatten;
pub mod dense;

pub use conv2d::Conv2d;
pub use pooling::MaxPool2d;
pub use batch_norm::BatchNorm;
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use dense::Dense;

use rand::rngs::StdRng;

use crate::math::tensor::Tensor;

/// One runtime layer of a compiled model.
///
/// Every variant offers three passes:
/// - `forward` (training) caches whatever `backward` needs,
/// - `infer` reads parameters only and leaves no state behind,
/// - `backward` stores parameter gradients and returns ∂L/∂input.
#[derive(Debug, Clone)]
pub enum Layer {
    Conv2d(Conv2d),
    MaxPool2d(MaxPool2d),
    BatchNorm(BatchNorm),
    Dropout(Dropout),
    Flatten(Flatten),
    Dense(Dense),
}

impl Layer {
    pub fn forward(&mut self, x: &Tensor, rng: &mut StdRng) -> Tensor {
        match self {
            Layer::Conv2d(l) => l.forward(x),
            Layer::MaxPool2d(l) => l.forward(x),
            Layer::BatchNorm(l) => l.forward(x),
            Layer::Dropout(l) => l.forward(x, rng),
            Layer::Flatten(l) => l.forward(x),
            Layer::Dense(l) => l.forward(x),
        }
    }

    pub fn infer(&self, x: &Tensor) -> Tensor {
        match self {
            Layer::Conv2d(l) => l.infer(x),
            Layer::MaxPool2d(l) => l.infer(x),
            Layer::BatchNorm(l) => l.infer(x),
            Layer::Dropout(l) => l.infer(x),
            Layer::Flatten(l) => l.infer(x),
            Layer::Dense(l) => l.infer(x),
        }
    }

    pub fn backward(&mut self, grad_out: &Tensor) -> Tensor {
        match self {
            Layer::Conv2d(l) => l.backward(grad_out),
            Layer::MaxPool2d(l) => l.backward(grad_out),
            Layer::BatchNorm(l) => l.backward(grad_out),
            Layer::Dropout(l) => l.backward(grad_out),
            Layer::Flatten(l) => l.backward(grad_out),
            Layer::Dense(l) => l.backward(grad_out),
        }
    }

    /// `(parameter, gradient)` pairs the optimizer updates, in a fixed order.
    pub fn trainable(&mut self) -> Vec<(&mut Tensor, &Tensor)> {
        match self {
            Layer::Conv2d(l) => l.trainable(),
            Layer::BatchNorm(l) => l.trainable(),
            Layer::Dense(l) => l.trainable(),
            _ => Vec::new(),
        }
    }

    /// Every persisted tensor (trainable or not), in manifest order.
    pub fn weights(&self) -> Vec<(&'static str, &Tensor)> {
        match self {
            Layer::Conv2d(l) => l.weights(),
            Layer::BatchNorm(l) => l.weights(),
            Layer::Dense(l) => l.weights(),
            _ => Vec::new(),
        }
    }

    pub fn weights_mut(&mut self) -> Vec<(&'static str, &mut Tensor)> {
        match self {
            Layer::Conv2d(l) => l.weights_mut(),
            Layer::BatchNorm(l) => l.weights_mut(),
            Layer::Dense(l) => l.weights_mut(),
            _ => Vec::new(),
        }
    }

    pub fn param_count(&self) -> usize {
        self.weights().iter().map(|(_, t)| t.len()).sum()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Layer::Conv2d(_) => "conv2d",
            Layer::MaxPool2d(_) => "max_pooling2d",
            Layer::BatchNorm(_) => "batch_normalization",
            Layer::Dropout(_) => "dropout",
            Layer::Flatten(_) => "flatten",
            Layer::Dense(_) => "dense",
        }
    }
}
