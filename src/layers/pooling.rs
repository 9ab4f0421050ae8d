use crate::math::tensor::Tensor;

/// Max pooling over NHWC input, valid padding.
#[derive(Debug, Clone)]
pub struct MaxPool2d {
    pub pool_size: usize,
    pub stride: usize,
    input_shape: Vec<usize>,
    // Flat input index that won each output cell; routes gradients back.
    argmax: Vec<usize>,
}

impl MaxPool2d {
    pub fn new(pool_size: usize, stride: usize) -> MaxPool2d {
        MaxPool2d { pool_size, stride, input_shape: Vec::new(), argmax: Vec::new() }
    }

    /// `[h, w, c]` → `[(h - p) / s + 1, (w - p) / s + 1, c]`.
    pub fn output_shape(&self, input: &[usize]) -> Vec<usize> {
        vec![
            (input[0] - self.pool_size) / self.stride + 1,
            (input[1] - self.pool_size) / self.stride + 1,
            input[2],
        ]
    }

    fn pool(&self, x: &Tensor) -> (Tensor, Vec<usize>) {
        let (n, h, w, c) = (x.shape[0], x.shape[1], x.shape[2], x.shape[3]);
        let out_shape = self.output_shape(&[h, w, c]);
        let (oh, ow) = (out_shape[0], out_shape[1]);
        let mut out = Tensor::zeros(&[n, oh, ow, c]);
        let mut winners = vec![0usize; out.len()];

        for b in 0..n {
            for oy in 0..oh {
                for ox in 0..ow {
                    for ch in 0..c {
                        let mut best = f64::NEG_INFINITY;
                        let mut best_idx = 0;
                        for dy in 0..self.pool_size {
                            for dx in 0..self.pool_size {
                                let iy = oy * self.stride + dy;
                                let ix = ox * self.stride + dx;
                                let idx = ((b * h + iy) * w + ix) * c + ch;
                                if x.data[idx] > best {
                                    best = x.data[idx];
                                    best_idx = idx;
                                }
                            }
                        }
                        let o = ((b * oh + oy) * ow + ox) * c + ch;
                        out.data[o] = best;
                        winners[o] = best_idx;
                    }
                }
            }
        }
        (out, winners)
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        let (out, winners) = self.pool(x);
        self.input_shape = x.shape.clone();
        self.argmax = winners;
        out
    }

    pub fn infer(&self, x: &Tensor) -> Tensor {
        self.pool(x).0
    }

    pub fn backward(&mut self, grad_out: &Tensor) -> Tensor {
        let mut input_grad = Tensor::zeros(&self.input_shape);
        for (&idx, &g) in self.argmax.iter().zip(grad_out.data.iter()) {
            input_grad.data[idx] += g;
        }
        input_grad
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_sizes_floor() {
        let pool = MaxPool2d::new(2, 2);
        assert_eq!(pool.output_shape(&[26, 26, 16]), vec![13, 13, 16]);
        assert_eq!(pool.output_shape(&[11, 11, 32]), vec![5, 5, 32]);
    }

    #[test]
    fn routes_gradient_to_the_maximum() {
        let mut pool = MaxPool2d::new(2, 2);
        let x = Tensor::from_vec(&[1, 2, 2, 1], vec![1.0, 4.0, 3.0, 2.0]).unwrap();
        let out = pool.forward(&x);
        assert_eq!(out.data, vec![4.0]);
        let grad = pool.backward(&Tensor::filled(&[1, 1, 1, 1], 2.5));
        assert_eq!(grad.data, vec![0.0, 2.5, 0.0, 0.0]);
    }
}
