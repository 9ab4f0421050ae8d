use crate::math::tensor::Tensor;

/// Categorical cross-entropy loss for use with a Softmax output layer.
pub struct CrossEntropyLoss;

/// Probabilities are clipped to `[EPS, 1 - EPS]` before the log.
const EPS: f64 = 1e-7;

impl CrossEntropyLoss {
    /// Mean cross-entropy over the batch:
    ///   L = -1/N · Σ_n Σ_i expected[n,i] · log(clip(predicted[n,i]))
    ///
    /// `predicted`: softmax probabilities, shape [N, n_classes]
    /// `expected` : one-hot target distribution, shape [N, n_classes]
    pub fn loss(predicted: &Tensor, expected: &Tensor) -> f64 {
        let n = predicted.batch_size().max(1) as f64;
        predicted.data.iter().zip(expected.data.iter())
            .map(|(p, e)| -e * p.clamp(EPS, 1.0 - EPS).ln())
            .sum::<f64>() / n
    }

    /// Gradient of the combined Softmax + mean cross-entropy w.r.t. the
    /// pre-softmax logits:
    ///   ∂L/∂z[n,i] = (predicted[n,i] - expected[n,i]) / N
    ///
    /// The Softmax layer's own derivative is identity (1.0), so this delta is
    /// not double-applied.
    pub fn derivative(predicted: &Tensor, expected: &Tensor) -> Tensor {
        let n = predicted.batch_size().max(1) as f64;
        predicted.zip_map(expected, |p, e| (p - e) / n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_prediction_has_near_zero_loss() {
        let y = Tensor::from_vec(&[1, 3], vec![0.0, 1.0, 0.0]).unwrap();
        assert!(CrossEntropyLoss::loss(&y, &y) < 1e-6);
    }

    #[test]
    fn uniform_prediction_costs_log_k() {
        let p = Tensor::filled(&[2, 10], 0.1);
        let mut y = Tensor::zeros(&[2, 10]);
        y.data[3] = 1.0;
        y.data[17] = 1.0;
        assert!((CrossEntropyLoss::loss(&p, &y) - 10f64.ln()).abs() < 1e-9);
        let grad = CrossEntropyLoss::derivative(&p, &y);
        assert!((grad.data[3] - (0.1 - 1.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn zero_probability_stays_finite() {
        let p = Tensor::from_vec(&[1, 2], vec![0.0, 1.0]).unwrap();
        let y = Tensor::from_vec(&[1, 2], vec![1.0, 0.0]).unwrap();
        assert!(CrossEntropyLoss::loss(&p, &y).is_finite());
    }
}
