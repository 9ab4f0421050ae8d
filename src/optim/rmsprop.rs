use serde::{Serialize, Deserialize};

use crate::{math::tensor::Tensor, layers::Layer};

/// RMSProp hyperparameters. `Default` matches the usual framework defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RmsPropConfig {
    pub learning_rate: f64,
    pub rho: f64,
    pub epsilon: f64,
    pub momentum: f64,
}

impl Default for RmsPropConfig {
    fn default() -> Self {
        RmsPropConfig { learning_rate: 0.001, rho: 0.9, epsilon: 1e-7, momentum: 0.0 }
    }
}

/// RMSProp with per-parameter running mean of squared gradients:
///
/// ```text
/// ms  = ρ·ms + (1 − ρ)·g²
/// mom = μ·mom + lr·g / √(ms + ε)
/// p  -= mom
/// ```
/// With μ = 0 this is the plain `p -= lr·g / √(ms + ε)` update.
#[derive(Debug, Clone)]
pub struct RmsProp {
    pub config: RmsPropConfig,
    mean_square: Vec<Tensor>,
    moment: Vec<Tensor>,
    iterations: u64,
}

impl RmsProp {
    pub fn new(config: RmsPropConfig) -> RmsProp {
        RmsProp { config, mean_square: Vec::new(), moment: Vec::new(), iterations: 0 }
    }

    /// Number of parameter updates applied so far.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Applies one update to every trainable tensor of `layers` using the
    /// gradients stored by the last backward pass.
    pub fn step(&mut self, layers: &mut [Layer]) {
        let RmsPropConfig { learning_rate, rho, epsilon, momentum } = self.config;
        let mut slot = 0;
        for layer in layers.iter_mut() {
            for (param, grad) in layer.trainable() {
                if self.mean_square.len() <= slot {
                    self.mean_square.push(Tensor::zeros(&param.shape));
                    self.moment.push(Tensor::zeros(&param.shape));
                }
                let ms = &mut self.mean_square[slot];
                let mom = &mut self.moment[slot];
                for i in 0..param.data.len() {
                    let g = grad.data[i];
                    ms.data[i] = rho * ms.data[i] + (1.0 - rho) * g * g;
                    mom.data[i] = momentum * mom.data[i]
                        + learning_rate * g / (ms.data[i] + epsilon).sqrt();
                    param.data[i] -= mom.data[i];
                }
                slot += 1;
            }
        }
        self.iterations += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::layers::Dense;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn first_step_moves_by_lr_over_sqrt_one_minus_rho() {
        let mut dense = Dense::new(1, 1, ActivationFunction::Identity, &mut StdRng::seed_from_u64(0));
        dense.weights = Tensor::from_vec(&[1, 1], vec![1.0]).unwrap();
        let x = Tensor::from_vec(&[1, 1], vec![1.0]).unwrap();
        dense.forward(&x);
        dense.backward(&Tensor::filled(&[1, 1], 0.5));

        let mut layers = vec![Layer::Dense(dense)];
        let mut opt = RmsProp::new(RmsPropConfig::default());
        opt.step(&mut layers);

        // ms = 0.1·0.25, update = lr·0.5/√0.025 = lr·√10
        let expected = 1.0 - 0.001 * 10f64.sqrt();
        match &layers[0] {
            Layer::Dense(d) => assert!((d.weights.data[0] - expected).abs() < 1e-6),
            _ => unreachable!(),
        }
        assert_eq!(opt.iterations(), 1);
    }
}
