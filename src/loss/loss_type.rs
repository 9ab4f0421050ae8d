use serde::{Serialize, Deserialize};

use crate::math::tensor::Tensor;
use crate::loss::cross_entropy::CrossEntropyLoss;

/// Selects which loss function the training loop uses.
///
/// - `CategoricalCrossEntropy`: pair with a Softmax output. The gradient is
///   the combined Softmax+CE gradient, matching `CrossEntropyLoss::derivative()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    CategoricalCrossEntropy,
}

impl LossType {
    pub fn loss(&self, predicted: &Tensor, expected: &Tensor) -> f64 {
        match self {
            LossType::CategoricalCrossEntropy => CrossEntropyLoss::loss(predicted, expected),
        }
    }

    pub fn derivative(&self, predicted: &Tensor, expected: &Tensor) -> Tensor {
        match self {
            LossType::CategoricalCrossEntropy => CrossEntropyLoss::derivative(predicted, expected),
        }
    }
}
