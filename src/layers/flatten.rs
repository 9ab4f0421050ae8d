use crate::math::tensor::Tensor;

/// Collapses every non-batch dimension into one.
#[derive(Debug, Clone, Default)]
pub struct Flatten {
    input_shape: Vec<usize>,
}

impl Flatten {
    pub fn new() -> Flatten {
        Flatten::default()
    }

    pub fn output_shape(&self, input: &[usize]) -> Vec<usize> {
        vec![input.iter().product()]
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        self.input_shape = x.shape.clone();
        self.infer(x)
    }

    pub fn infer(&self, x: &Tensor) -> Tensor {
        Tensor { shape: vec![x.batch_size(), x.sample_len()], data: x.data.clone() }
    }

    pub fn backward(&mut self, grad_out: &Tensor) -> Tensor {
        Tensor { shape: self.input_shape.clone(), data: grad_out.data.clone() }
    }
}
