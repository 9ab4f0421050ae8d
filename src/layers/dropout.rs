use rand::Rng;
use rand::rngs::StdRng;

use crate::math::tensor::Tensor;

/// Inverted dropout: zeroes `rate` of the activations while training and
/// rescales the survivors by `1 / (1 - rate)`; identity at inference.
#[derive(Debug, Clone)]
pub struct Dropout {
    pub rate: f64,
    mask: Vec<f64>,
}

impl Dropout {
    pub fn new(rate: f64) -> Dropout {
        Dropout { rate, mask: Vec::new() }
    }

    pub fn forward(&mut self, x: &Tensor, rng: &mut StdRng) -> Tensor {
        let keep = 1.0 - self.rate;
        self.mask = (0..x.len())
            .map(|_| if rng.gen::<f64>() < keep { 1.0 / keep } else { 0.0 })
            .collect();
        Tensor {
            shape: x.shape.clone(),
            data: x.data.iter().zip(&self.mask).map(|(v, m)| v * m).collect(),
        }
    }

    pub fn infer(&self, x: &Tensor) -> Tensor {
        x.clone()
    }

    pub fn backward(&mut self, grad_out: &Tensor) -> Tensor {
        Tensor {
            shape: grad_out.shape.clone(),
            data: grad_out.data.iter().zip(&self.mask).map(|(g, m)| g * m).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn drops_roughly_rate_and_preserves_expectation() {
        let mut dropout = Dropout::new(0.25);
        let x = Tensor::filled(&[1, 10_000], 1.0);
        let out = dropout.forward(&x, &mut StdRng::seed_from_u64(11));
        let zeros = out.data.iter().filter(|v| **v == 0.0).count();
        assert!((2_200..2_800).contains(&zeros));
        let mean = out.sum() / out.len() as f64;
        assert!((mean - 1.0).abs() < 0.05);
        assert_eq!(dropout.infer(&x), x);
    }
}
