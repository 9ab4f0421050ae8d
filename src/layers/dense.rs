use rand::rngs::StdRng;

use crate::{math::tensor::Tensor, activation::activation::ActivationFunction};

/// Fully connected layer over `[batch, input_size]`.
#[derive(Debug, Clone)]
pub struct Dense {
    pub units: usize,
    pub input_size: usize,
    pub weights: Tensor, // [input_size, units]
    pub biases: Tensor,  // [units]
    pub activator: ActivationFunction,
    weights_grad: Tensor,
    biases_grad: Tensor,
    input: Tensor,
    pre_neurons: Tensor, // pre-activation values (z = xW + b) needed for correct derivative
}

impl Dense {
    /// He init for ReLU layers, Xavier for everything else; zero biases.
    pub fn new(units: usize, input_size: usize, activation: ActivationFunction, rng: &mut StdRng) -> Dense {
        let shape = [input_size, units];
        let weights = match activation {
            ActivationFunction::ReLU => Tensor::he(&shape, input_size, rng),
            _ => Tensor::xavier(&shape, input_size, rng),
        };

        Dense {
            units,
            input_size,
            weights,
            biases: Tensor::zeros(&[units]),
            weights_grad: Tensor::zeros(&shape),
            biases_grad: Tensor::zeros(&[units]),
            activator: activation,
            input: Tensor::default(),
            pre_neurons: Tensor::default(),
        }
    }

    fn linear(&self, x: &Tensor) -> Tensor {
        let n = x.batch_size();
        let mut z = Tensor::zeros(&[n, self.units]);
        for b in 0..n {
            let row = &x.data[b * self.input_size..(b + 1) * self.input_size];
            let out = &mut z.data[b * self.units..(b + 1) * self.units];
            out.copy_from_slice(&self.biases.data);
            for (i, &xv) in row.iter().enumerate() {
                let w_row = &self.weights.data[i * self.units..(i + 1) * self.units];
                for (o, &w) in out.iter_mut().zip(w_row) {
                    *o += xv * w;
                }
            }
        }
        z
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        let z = self.linear(x);
        let mut a = z.clone();
        self.activator.apply_rows(&mut a.data, self.units);
        self.input = x.clone();
        self.pre_neurons = z;
        a
    }

    pub fn infer(&self, x: &Tensor) -> Tensor {
        let mut a = self.linear(x);
        self.activator.apply_rows(&mut a.data, self.units);
        a
    }

    /// Stores weight/bias gradients and returns ∂L/∂input.
    /// `grad_out` is ∂L/∂a for this layer (error in activation space).
    pub fn backward(&mut self, grad_out: &Tensor) -> Tensor {
        // Element-wise (Hadamard) product: δ = error ⊙ σ'(z)
        let delta = grad_out.zip_map(&self.pre_neurons, |g, z| g * self.activator.derivative(z));
        let n = delta.batch_size();

        let mut weights_grad = Tensor::zeros(&self.weights.shape);
        let mut biases_grad = Tensor::zeros(&[self.units]);
        let mut input_grad = Tensor::zeros(&[n, self.input_size]);

        for b in 0..n {
            let d_row = &delta.data[b * self.units..(b + 1) * self.units];
            let x_row = &self.input.data[b * self.input_size..(b + 1) * self.input_size];
            for (bg, &d) in biases_grad.data.iter_mut().zip(d_row) {
                *bg += d;
            }
            for i in 0..self.input_size {
                let w_row = &self.weights.data[i * self.units..(i + 1) * self.units];
                let wg_row = &mut weights_grad.data[i * self.units..(i + 1) * self.units];
                let mut dx = 0.0;
                for o in 0..self.units {
                    wg_row[o] += x_row[i] * d_row[o];
                    dx += w_row[o] * d_row[o];
                }
                input_grad.data[b * self.input_size + i] = dx;
            }
        }

        self.weights_grad = weights_grad;
        self.biases_grad = biases_grad;
        input_grad
    }

    pub fn trainable(&mut self) -> Vec<(&mut Tensor, &Tensor)> {
        vec![(&mut self.weights, &self.weights_grad), (&mut self.biases, &self.biases_grad)]
    }

    pub fn weights(&self) -> Vec<(&'static str, &Tensor)> {
        vec![("kernel", &self.weights), ("bias", &self.biases)]
    }

    pub fn weights_mut(&mut self) -> Vec<(&'static str, &mut Tensor)> {
        vec![("kernel", &mut self.weights), ("bias", &mut self.biases)]
    }
}
