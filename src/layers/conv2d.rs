use rand::rngs::StdRng;

use crate::{math::tensor::Tensor, activation::activation::ActivationFunction};

/// 2-D convolution over NHWC input, valid padding, stride 1.
///
/// Kernel layout is `[kernel_h, kernel_w, in_channels, filters]`, the same
/// layout the output of `weights()` is persisted in.
#[derive(Debug, Clone)]
pub struct Conv2d {
    pub filters: usize,
    pub kernel_size: usize,
    pub in_channels: usize,
    pub kernel: Tensor,
    pub bias: Tensor,
    pub activator: ActivationFunction,
    kernel_grad: Tensor,
    bias_grad: Tensor,
    input: Tensor,
    pre_activation: Tensor, // z, needed for the activation derivative
}

impl Conv2d {
    pub fn new(
        filters: usize,
        kernel_size: usize,
        in_channels: usize,
        activation: ActivationFunction,
        rng: &mut StdRng,
    ) -> Conv2d {
        let shape = [kernel_size, kernel_size, in_channels, filters];
        let fan_in = kernel_size * kernel_size * in_channels;
        let kernel = match activation {
            ActivationFunction::ReLU => Tensor::he(&shape, fan_in, rng),
            _ => Tensor::xavier(&shape, fan_in, rng),
        };
        Conv2d {
            filters,
            kernel_size,
            in_channels,
            kernel_grad: Tensor::zeros(&shape),
            kernel,
            bias: Tensor::zeros(&[filters]),
            bias_grad: Tensor::zeros(&[filters]),
            activator: activation,
            input: Tensor::default(),
            pre_activation: Tensor::default(),
        }
    }

    /// `[h, w, c]` → `[h - k + 1, w - k + 1, filters]`.
    pub fn output_shape(&self, input: &[usize]) -> Vec<usize> {
        vec![input[0] + 1 - self.kernel_size, input[1] + 1 - self.kernel_size, self.filters]
    }

    fn convolve(&self, x: &Tensor) -> Tensor {
        let (n, h, w, c) = (x.shape[0], x.shape[1], x.shape[2], x.shape[3]);
        let k = self.kernel_size;
        let f = self.filters;
        let (oh, ow) = (h + 1 - k, w + 1 - k);
        let mut out = Tensor::zeros(&[n, oh, ow, f]);

        for b in 0..n {
            for oy in 0..oh {
                for ox in 0..ow {
                    let o_base = ((b * oh + oy) * ow + ox) * f;
                    let acc = &mut out.data[o_base..o_base + f];
                    acc.copy_from_slice(&self.bias.data);
                    for ky in 0..k {
                        for kx in 0..k {
                            let x_base = ((b * h + oy + ky) * w + ox + kx) * c;
                            for ic in 0..c {
                                let xv = x.data[x_base + ic];
                                if xv == 0.0 {
                                    continue;
                                }
                                let k_base = ((ky * k + kx) * c + ic) * f;
                                let k_row = &self.kernel.data[k_base..k_base + f];
                                for (a, &kv) in acc.iter_mut().zip(k_row) {
                                    *a += xv * kv;
                                }
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Training-mode forward pass; keeps the input and z for `backward`.
    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        let z = self.convolve(x);
        let mut a = z.clone();
        self.activator.apply_rows(&mut a.data, self.filters);
        self.input = x.clone();
        self.pre_activation = z;
        a
    }

    /// Inference-mode forward pass; touches no layer state.
    pub fn infer(&self, x: &Tensor) -> Tensor {
        let mut a = self.convolve(x);
        self.activator.apply_rows(&mut a.data, self.filters);
        a
    }

    /// Stores ∂L/∂kernel and ∂L/∂bias, returns ∂L/∂input.
    /// `grad_out` is ∂L/∂a for this layer (activation space).
    pub fn backward(&mut self, grad_out: &Tensor) -> Tensor {
        let x = &self.input;
        let (n, h, w, c) = (x.shape[0], x.shape[1], x.shape[2], x.shape[3]);
        let k = self.kernel_size;
        let f = self.filters;
        let (oh, ow) = (h + 1 - k, w + 1 - k);

        // δ = error ⊙ σ'(z)
        let delta = grad_out.zip_map(&self.pre_activation, |g, z| g * self.activator.derivative(z));

        let mut kernel_grad = Tensor::zeros(&self.kernel.shape);
        let mut bias_grad = Tensor::zeros(&[f]);
        let mut input_grad = Tensor::zeros(&x.shape);

        for b in 0..n {
            for oy in 0..oh {
                for ox in 0..ow {
                    let d_base = ((b * oh + oy) * ow + ox) * f;
                    let d_row = &delta.data[d_base..d_base + f];
                    for (bg, &d) in bias_grad.data.iter_mut().zip(d_row) {
                        *bg += d;
                    }
                    for ky in 0..k {
                        for kx in 0..k {
                            let x_base = ((b * h + oy + ky) * w + ox + kx) * c;
                            for ic in 0..c {
                                let k_base = ((ky * k + kx) * c + ic) * f;
                                let xv = x.data[x_base + ic];
                                let k_row = &self.kernel.data[k_base..k_base + f];
                                let kg_row = &mut kernel_grad.data[k_base..k_base + f];
                                let mut dx = 0.0;
                                for o in 0..f {
                                    kg_row[o] += xv * d_row[o];
                                    dx += k_row[o] * d_row[o];
                                }
                                input_grad.data[x_base + ic] += dx;
                            }
                        }
                    }
                }
            }
        }

        self.kernel_grad = kernel_grad;
        self.bias_grad = bias_grad;
        input_grad
    }

    pub fn trainable(&mut self) -> Vec<(&mut Tensor, &Tensor)> {
        vec![(&mut self.kernel, &self.kernel_grad), (&mut self.bias, &self.bias_grad)]
    }

    pub fn weights(&self) -> Vec<(&'static str, &Tensor)> {
        vec![("kernel", &self.kernel), ("bias", &self.bias)]
    }

    pub fn weights_mut(&mut self) -> Vec<(&'static str, &mut Tensor)> {
        vec![("kernel", &mut self.kernel), ("bias", &mut self.bias)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn layer(filters: usize, in_channels: usize) -> Conv2d {
        Conv2d::new(filters, 3, in_channels, ActivationFunction::Identity, &mut StdRng::seed_from_u64(1))
    }

    #[test]
    fn valid_padding_shrinks_by_kernel_minus_one() {
        let conv = layer(16, 1);
        assert_eq!(conv.output_shape(&[28, 28, 1]), vec![26, 26, 16]);
        let out = conv.infer(&Tensor::zeros(&[2, 28, 28, 1]));
        assert_eq!(out.shape, vec![2, 26, 26, 16]);
    }

    #[test]
    fn box_kernel_sums_window() {
        let mut conv = layer(1, 1);
        conv.kernel = Tensor::filled(&[3, 3, 1, 1], 1.0);
        conv.bias = Tensor::from_vec(&[1], vec![0.5]).unwrap();
        let x = Tensor::from_vec(&[1, 3, 4, 1], (0..12).map(|v| v as f64).collect()).unwrap();
        let out = conv.infer(&x);
        assert_eq!(out.shape, vec![1, 1, 2, 1]);
        // window over cols 0..3 of rows 0..3: 0+1+2+4+5+6+8+9+10 = 45
        assert_eq!(out.data, vec![45.5, 54.5]);
    }

    #[test]
    fn backward_matches_finite_difference() {
        let mut conv = layer(2, 2);
        let mut rng = StdRng::seed_from_u64(3);
        let x = Tensor::he(&[1, 4, 4, 2], 1, &mut rng);
        // L = sum(a), so ∂L/∂a = 1 everywhere.
        let out = conv.forward(&x);
        let input_grad = conv.backward(&Tensor::filled(&out.shape, 1.0));

        let eps = 1e-6;
        let idx = 5;
        let mut plus = x.clone();
        plus.data[idx] += eps;
        let mut minus = x.clone();
        minus.data[idx] -= eps;
        let numeric = (conv.infer(&plus).sum() - conv.infer(&minus).sum()) / (2.0 * eps);
        assert!((numeric - input_grad.data[idx]).abs() < 1e-6);

        let k_idx = 7;
        let analytic = conv.kernel_grad.data[k_idx];
        conv.kernel.data[k_idx] += eps;
        let up = conv.infer(&x).sum();
        conv.kernel.data[k_idx] -= 2.0 * eps;
        let down = conv.infer(&x).sum();
        assert!(((up - down) / (2.0 * eps) - analytic).abs() < 1e-6);
    }
}
