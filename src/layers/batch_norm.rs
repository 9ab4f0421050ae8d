use crate::math::tensor::Tensor;

pub const DEFAULT_MOMENTUM: f64 = 0.99;
pub const DEFAULT_EPSILON: f64 = 1e-3;

/// Batch normalization over the last (channel) axis.
///
/// Training normalizes with the statistics of the current batch and folds
/// them into the moving mean/variance; inference uses the moving values only.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    pub channels: usize,
    pub momentum: f64,
    pub epsilon: f64,
    pub gamma: Tensor,
    pub beta: Tensor,
    pub moving_mean: Tensor,
    pub moving_variance: Tensor,
    gamma_grad: Tensor,
    beta_grad: Tensor,
    normalized: Tensor, // x̂ of the last training batch
    inv_std: Vec<f64>,
}

impl BatchNorm {
    pub fn new(channels: usize, momentum: f64, epsilon: f64) -> BatchNorm {
        BatchNorm {
            channels,
            momentum,
            epsilon,
            gamma: Tensor::filled(&[channels], 1.0),
            beta: Tensor::zeros(&[channels]),
            moving_mean: Tensor::zeros(&[channels]),
            moving_variance: Tensor::filled(&[channels], 1.0),
            gamma_grad: Tensor::zeros(&[channels]),
            beta_grad: Tensor::zeros(&[channels]),
            normalized: Tensor::default(),
            inv_std: Vec::new(),
        }
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        let c = self.channels;
        let count = (x.len() / c) as f64;

        let mut mean = vec![0.0; c];
        for (i, &v) in x.data.iter().enumerate() {
            mean[i % c] += v;
        }
        mean.iter_mut().for_each(|m| *m /= count);

        let mut variance = vec![0.0; c];
        for (i, &v) in x.data.iter().enumerate() {
            let d = v - mean[i % c];
            variance[i % c] += d * d;
        }
        variance.iter_mut().for_each(|v| *v /= count);

        let inv_std: Vec<f64> = variance.iter().map(|v| 1.0 / (v + self.epsilon).sqrt()).collect();

        let mut normalized = Tensor::zeros(&x.shape);
        let mut out = Tensor::zeros(&x.shape);
        for (i, &v) in x.data.iter().enumerate() {
            let ch = i % c;
            let x_hat = (v - mean[ch]) * inv_std[ch];
            normalized.data[i] = x_hat;
            out.data[i] = self.gamma.data[ch] * x_hat + self.beta.data[ch];
        }

        for ch in 0..c {
            self.moving_mean.data[ch] =
                self.moving_mean.data[ch] * self.momentum + mean[ch] * (1.0 - self.momentum);
            self.moving_variance.data[ch] =
                self.moving_variance.data[ch] * self.momentum + variance[ch] * (1.0 - self.momentum);
        }

        self.normalized = normalized;
        self.inv_std = inv_std;
        out
    }

    pub fn infer(&self, x: &Tensor) -> Tensor {
        let c = self.channels;
        let mut out = x.clone();
        for (i, v) in out.data.iter_mut().enumerate() {
            let ch = i % c;
            let inv_std = 1.0 / (self.moving_variance.data[ch] + self.epsilon).sqrt();
            *v = self.gamma.data[ch] * (*v - self.moving_mean.data[ch]) * inv_std + self.beta.data[ch];
        }
        out
    }

    pub fn backward(&mut self, grad_out: &Tensor) -> Tensor {
        let c = self.channels;
        let count = (grad_out.len() / c) as f64;

        let mut sum_dy = vec![0.0; c];
        let mut sum_dy_xhat = vec![0.0; c];
        for (i, (&g, &x_hat)) in grad_out.data.iter().zip(self.normalized.data.iter()).enumerate() {
            sum_dy[i % c] += g;
            sum_dy_xhat[i % c] += g * x_hat;
        }

        // dx = γ/σ · (dy − mean(dy) − x̂ · mean(dy · x̂))
        let mut input_grad = Tensor::zeros(&grad_out.shape);
        for (i, (&g, &x_hat)) in grad_out.data.iter().zip(self.normalized.data.iter()).enumerate() {
            let ch = i % c;
            input_grad.data[i] = self.gamma.data[ch] * self.inv_std[ch]
                * (g - sum_dy[ch] / count - x_hat * sum_dy_xhat[ch] / count);
        }

        self.gamma_grad = Tensor { shape: vec![c], data: sum_dy_xhat };
        self.beta_grad = Tensor { shape: vec![c], data: sum_dy };
        input_grad
    }

    pub fn trainable(&mut self) -> Vec<(&mut Tensor, &Tensor)> {
        vec![(&mut self.gamma, &self.gamma_grad), (&mut self.beta, &self.beta_grad)]
    }

    pub fn weights(&self) -> Vec<(&'static str, &Tensor)> {
        vec![
            ("gamma", &self.gamma),
            ("beta", &self.beta),
            ("moving_mean", &self.moving_mean),
            ("moving_variance", &self.moving_variance),
        ]
    }

    pub fn weights_mut(&mut self) -> Vec<(&'static str, &mut Tensor)> {
        vec![
            ("gamma", &mut self.gamma),
            ("beta", &mut self.beta),
            ("moving_mean", &mut self.moving_mean),
            ("moving_variance", &mut self.moving_variance),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn training_output_is_standardized_per_channel() {
        let mut bn = BatchNorm::new(2, DEFAULT_MOMENTUM, 0.0);
        let x = Tensor::from_vec(&[4, 2], vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0]).unwrap();
        let out = bn.forward(&x);
        for ch in 0..2 {
            let vals: Vec<f64> = out.data.iter().skip(ch).step_by(2).cloned().collect();
            let mean: f64 = vals.iter().sum::<f64>() / 4.0;
            let var: f64 = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 4.0;
            assert!(mean.abs() < 1e-12);
            assert!((var - 1.0).abs() < 1e-9);
        }
        // moving mean moved 1% of the way toward the batch mean
        assert!((bn.moving_mean.data[0] - 0.025).abs() < 1e-12);
    }

    #[test]
    fn fresh_layer_infers_near_identity() {
        let bn = BatchNorm::new(1, DEFAULT_MOMENTUM, DEFAULT_EPSILON);
        let x = Tensor::from_vec(&[2, 1], vec![0.5, -0.5]).unwrap();
        let out = bn.infer(&x);
        let scale = 1.0 / (1.0 + DEFAULT_EPSILON).sqrt();
        assert!((out.data[0] - 0.5 * scale).abs() < 1e-12);
    }

    #[test]
    fn gradient_of_sum_vanishes() {
        // Σ y = Σ (γ x̂ + β) does not depend on x, so ∂/∂x is zero.
        let mut bn = BatchNorm::new(1, DEFAULT_MOMENTUM, DEFAULT_EPSILON);
        let x = Tensor::from_vec(&[3, 1], vec![0.2, 1.5, -0.7]).unwrap();
        bn.forward(&x);
        let grad = bn.backward(&Tensor::filled(&[3, 1], 1.0));
        assert!(grad.data.iter().all(|g| g.abs() < 1e-12));
        assert!((bn.beta_grad.data[0] - 3.0).abs() < 1e-12);
    }
}
