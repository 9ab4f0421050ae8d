use log::{debug, info};
use rand::{rngs::StdRng, SeedableRng};

use crate::error::{Error, Result};
use crate::layers::{BatchNorm, Conv2d, Dense, Dropout, Flatten, Layer, MaxPool2d};
use crate::math::tensor::Tensor;
use crate::network::metadata::ModelMetadata;
use crate::network::spec::{CompileConfig, LayerSpec, ModelSpec};
use crate::optim::rmsprop::RmsProp;

/// Samples pushed through `predict` at once; bounds the size of the
/// intermediate feature maps.
const PREDICT_CHUNK: usize = 256;

/// A compiled sequential model: topology, parameters and optimizer state.
///
/// Training (`train_on_batch`) needs `&mut self`; inference (`predict`)
/// only `&self`, so a model borrowed for a training run cannot be used for
/// prediction at the same time.
#[derive(Debug, Clone)]
pub struct Model {
    pub spec: ModelSpec,
    pub compile: CompileConfig,
    pub metadata: Option<ModelMetadata>,
    pub layers: Vec<Layer>,
    optimizer: RmsProp,
    rng: StdRng,
}

impl Model {
    /// Allocates parameters for `spec` (seeded, reproducible) and attaches
    /// the optimizer/loss configuration.
    pub fn compile(spec: ModelSpec, compile: CompileConfig, seed: u64) -> Result<Model> {
        let shapes = spec.output_shapes()?;
        let mut rng = StdRng::seed_from_u64(seed);

        let mut layers = Vec::with_capacity(spec.layers.len());
        let mut input = spec.input_shape.clone();
        for (layer_spec, output) in spec.layers.iter().zip(shapes) {
            let channels = *input.last().unwrap_or(&1);
            let layer = match layer_spec {
                LayerSpec::Conv2d { filters, kernel_size, activation } => {
                    Layer::Conv2d(Conv2d::new(*filters, *kernel_size, channels, *activation, &mut rng))
                }
                LayerSpec::MaxPool2d { pool_size, stride } => {
                    Layer::MaxPool2d(MaxPool2d::new(*pool_size, *stride))
                }
                LayerSpec::BatchNorm { momentum, epsilon } => {
                    Layer::BatchNorm(BatchNorm::new(channels, *momentum, *epsilon))
                }
                LayerSpec::Dropout { rate } => Layer::Dropout(Dropout::new(*rate)),
                LayerSpec::Flatten => Layer::Flatten(Flatten::new()),
                LayerSpec::Dense { units, activation } => {
                    Layer::Dense(Dense::new(*units, input[0], *activation, &mut rng))
                }
            };
            layers.push(layer);
            input = output;
        }

        let optimizer = RmsProp::new(compile.optimizer);
        let model = Model { spec, compile, metadata: None, layers, optimizer, rng };
        info!(
            "model '{}' compiled: {} layers, {} parameters",
            model.spec.name,
            model.layers.len(),
            model.param_count()
        );
        Ok(model)
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.spec.input_shape
    }

    /// Width of the final layer's output.
    pub fn output_units(&self) -> usize {
        self.spec.output_shape().ok().and_then(|s| s.first().copied()).unwrap_or(0)
    }

    pub fn param_count(&self) -> usize {
        self.layers.iter().map(Layer::param_count).sum()
    }

    /// Number of optimizer updates applied so far.
    pub fn iterations(&self) -> u64 {
        self.optimizer.iterations()
    }

    /// Verifies `x` is a `[batch, ..input_shape]` tensor.
    pub fn check_input(&self, x: &Tensor) -> Result<()> {
        if x.rank() != self.spec.input_shape.len() + 1 || x.sample_shape() != self.input_shape() {
            return Err(Error::config(format!(
                "model '{}' expects input [batch, {}], got {:?}",
                self.spec.name,
                self.input_shape().iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", "),
                x.shape
            )));
        }
        Ok(())
    }

    /// Inference-mode forward pass (dropout off, moving batch-norm
    /// statistics). Every intermediate feature map is dropped before the
    /// next chunk starts.
    pub fn predict(&self, x: &Tensor) -> Result<Tensor> {
        self.check_input(x)?;
        let n = x.batch_size();
        let mut parts = Vec::with_capacity(n.div_ceil(PREDICT_CHUNK));
        for start in (0..n).step_by(PREDICT_CHUNK) {
            let end = (start + PREDICT_CHUNK).min(n);
            let mut current = x.slice_batch(start, end);
            for layer in &self.layers {
                current = layer.infer(&current);
            }
            parts.push(current);
        }
        if parts.is_empty() {
            let mut shape = vec![0];
            shape.extend(self.spec.output_shape()?);
            return Ok(Tensor::zeros(&shape));
        }
        Tensor::concat_batch(&parts)
    }

    /// One optimizer step on a mini-batch. Returns `(loss, accuracy)` of the
    /// batch as seen by the forward pass before the update.
    pub fn train_on_batch(&mut self, x: &Tensor, y: &Tensor) -> Result<(f64, f64)> {
        self.check_input(x)?;
        if y.batch_size() != x.batch_size() || y.sample_len() != self.output_units() {
            return Err(Error::config(format!(
                "labels {:?} do not match {} samples of {} classes",
                y.shape, x.batch_size(), self.output_units()
            )));
        }

        // Forward pass: stores activations in each layer for backprop.
        let mut current = x.clone();
        for layer in &mut self.layers {
            current = layer.forward(&current, &mut self.rng);
        }
        let output = current;

        let loss = self.compile.loss.loss(&output, y);
        let accuracy = crate::metrics::accuracy(&output.argmax_rows(), &y.argmax_rows());

        // Backward pass: initial delta is the combined softmax/CE gradient.
        let mut delta = self.compile.loss.derivative(&output, y);
        for layer in self.layers.iter_mut().rev() {
            delta = layer.backward(&delta);
        }

        self.optimizer.step(&mut self.layers);
        debug!("step {}: loss {:.4}, acc {:.4}", self.optimizer.iterations(), loss, accuracy);
        Ok((loss, accuracy))
    }

    /// Text table of layers, output shapes and parameter counts.
    pub fn summary(&self) -> String {
        let shapes = self.spec.output_shapes().unwrap_or_default();
        let mut out = format!("Model: {}\n", self.spec.name);
        out.push_str(&format!("{:<28}{:<22}{:>10}\n", "Layer (type)", "Output shape", "Param #"));
        out.push_str(&format!("{}\n", "=".repeat(60)));
        for (i, (layer, shape)) in self.layers.iter().zip(shapes.iter()).enumerate() {
            let name = format!("{}_{} ({})", layer.kind(), i + 1, layer.kind());
            let shape = format!(
                "[batch,{}]",
                shape.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(",")
            );
            out.push_str(&format!("{:<28}{:<22}{:>10}\n", name, shape, layer.param_count()));
        }
        out.push_str(&format!("{}\n", "=".repeat(60)));
        out.push_str(&format!("Total params: {}\n", self.param_count()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::spec::{Variant, DIGIT_INPUT_SHAPE};

    fn digit_model(variant: Variant) -> Model {
        Model::compile(ModelSpec::digit_classifier(variant), CompileConfig::default(), 42).unwrap()
    }

    #[test]
    fn parameter_count_matches_topology() {
        // 160 + 4640 + 9248 + 18496 + 650
        assert_eq!(digit_model(Variant::Basic).param_count(), 33_194);
        // + gamma, beta, moving mean, moving variance for 32 channels
        assert_eq!(digit_model(Variant::Regularized).param_count(), 33_194 + 4 * 32);
    }

    #[test]
    fn predict_rejects_wrong_shape() {
        let model = digit_model(Variant::Basic);
        let err = model.predict(&Tensor::zeros(&[1, 32, 32, 1])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        let err = model.predict(&Tensor::zeros(&[28, 28, 1])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn predict_yields_distributions() {
        let model = digit_model(Variant::Regularized);
        let mut shape = vec![3];
        shape.extend(DIGIT_INPUT_SHAPE);
        let out = model.predict(&Tensor::filled(&shape, 0.5)).unwrap();
        assert_eq!(out.shape, vec![3, 10]);
        for row in out.data.chunks(10) {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn same_seed_same_parameters() {
        let a = digit_model(Variant::Basic);
        let b = digit_model(Variant::Basic);
        let x = Tensor::filled(&[1, 28, 28, 1], 0.25);
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn training_step_reduces_loss_on_repeated_batch() {
        let spec = ModelSpec::builder("tiny")
            .input_shape(&[4, 4, 1])
            .conv2d(2, 3, crate::activation::ActivationFunction::Identity)
            .flatten()
            .dense(2, crate::activation::ActivationFunction::Softmax)
            .build()
            .unwrap();
        let compile = CompileConfig {
            optimizer: crate::optim::RmsPropConfig { learning_rate: 0.01, ..Default::default() },
            ..Default::default()
        };
        let mut model = Model::compile(spec, compile, 5).unwrap();
        let mut x = Tensor::zeros(&[2, 4, 4, 1]);
        x.data[..16].iter_mut().for_each(|v| *v = 1.0);
        let y = Tensor::from_vec(&[2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();

        let (first, _) = model.train_on_batch(&x, &y).unwrap();
        let mut last = first;
        for _ in 0..50 {
            last = model.train_on_batch(&x, &y).unwrap().0;
        }
        assert!(last < first);
        assert_eq!(model.iterations(), 51);
    }

    #[test]
    fn summary_lists_every_layer() {
        let model = digit_model(Variant::Basic);
        let summary = model.summary();
        assert_eq!(summary.matches("conv2d_").count(), 3);
        assert!(summary.contains("Total params: 33194"));
    }
}
