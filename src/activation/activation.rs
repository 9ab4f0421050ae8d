use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationFunction {
    ReLU,
    Identity,
    /// Softmax is a vector-valued activation; it is applied row by row in
    /// `apply_rows()`, never through the element-wise `function()`.
    Softmax,
}

impl ActivationFunction {
    /// Element-wise activation.  For `Softmax`, use `apply_rows()`.
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Identity => x,
            ActivationFunction::Softmax => {
                panic!("ActivationFunction::Softmax::function() must not be called directly; \
                        use apply_rows() which applies the full-vector softmax.")
            }
        }
    }

    /// Element-wise derivative of the activation.
    ///
    /// For `Softmax`, the output layer is paired with cross-entropy and the
    /// combined gradient `predicted - expected` is already in activation
    /// space, so `1.0` passes it through without applying the Jacobian twice.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Identity => 1.0,
            ActivationFunction::Softmax => 1.0,
        }
    }

    /// Applies the activation to `data`, treating every `width` consecutive
    /// values as one row (softmax normalizes per row).
    pub fn apply_rows(&self, data: &mut [f64], width: usize) {
        match self {
            ActivationFunction::Softmax => {
                for row in data.chunks_mut(width.max(1)) {
                    softmax_in_place(row);
                }
            }
            _ => {
                for x in data.iter_mut() {
                    *x = self.function(*x);
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActivationFunction::ReLU => "relu",
            ActivationFunction::Identity => "linear",
            ActivationFunction::Softmax => "softmax",
        }
    }
}

/// Numerically stable softmax: shifts by the row maximum before exponentiating.
pub fn softmax_in_place(row: &mut [f64]) {
    let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }
    for x in row.iter_mut() {
        *x /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_rows_sum_to_one() {
        let mut data = vec![1.0, 2.0, 3.0, 1000.0, 1000.0, -1000.0];
        ActivationFunction::Softmax.apply_rows(&mut data, 3);
        for row in data.chunks(3) {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
            assert!(row.iter().all(|p| p.is_finite() && *p >= 0.0));
        }
        assert!((data[3] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn relu_clamps_negatives() {
        let mut data = vec![-2.0, 0.0, 3.5];
        ActivationFunction::ReLU.apply_rows(&mut data, 3);
        assert_eq!(data, vec![0.0, 0.0, 3.5]);
        assert_eq!(ActivationFunction::ReLU.derivative(-1.0), 0.0);
        assert_eq!(ActivationFunction::ReLU.derivative(1.0), 1.0);
    }
}
