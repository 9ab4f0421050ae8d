use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::batch_norm::{DEFAULT_EPSILON, DEFAULT_MOMENTUM};
use crate::loss::loss_type::LossType;
use crate::optim::rmsprop::RmsPropConfig;

/// Input shape every digit model declares: 28×28 pixels, one channel.
pub const DIGIT_INPUT_SHAPE: [usize; 3] = [28, 28, 1];
/// Number of digit classes.
pub const NUM_CLASSES: usize = 10;

/// Describes one layer in a model topology.
///
/// Shapes are never stored here; they are inferred from the model's input
/// shape by `LayerSpec::output_shape()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    /// Valid padding, stride 1, square kernel.
    Conv2d { filters: usize, kernel_size: usize, activation: ActivationFunction },
    MaxPool2d { pool_size: usize, stride: usize },
    BatchNorm { momentum: f64, epsilon: f64 },
    Dropout { rate: f64 },
    Flatten,
    Dense { units: usize, activation: ActivationFunction },
}

impl LayerSpec {
    /// Output shape (without batch dimension) for a given input shape.
    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        match self {
            LayerSpec::Conv2d { filters, kernel_size, .. } => {
                let [h, w, _] = spatial(input, "conv2d")?;
                if *kernel_size == 0 || *filters == 0 || *kernel_size > h || *kernel_size > w {
                    return Err(Error::config(format!(
                        "conv2d with {} filters of {}x{} does not fit input {:?}",
                        filters, kernel_size, kernel_size, input
                    )));
                }
                Ok(vec![h + 1 - kernel_size, w + 1 - kernel_size, *filters])
            }
            LayerSpec::MaxPool2d { pool_size, stride } => {
                let [h, w, c] = spatial(input, "max_pool2d")?;
                if *pool_size == 0 || *stride == 0 || *pool_size > h || *pool_size > w {
                    return Err(Error::config(format!(
                        "max_pool2d {}x{} stride {} does not fit input {:?}",
                        pool_size, pool_size, stride, input
                    )));
                }
                Ok(vec![(h - pool_size) / stride + 1, (w - pool_size) / stride + 1, c])
            }
            LayerSpec::BatchNorm { .. } | LayerSpec::Dropout { .. } => {
                if input.is_empty() {
                    return Err(Error::config("normalization layer needs a non-empty input shape"));
                }
                Ok(input.to_vec())
            }
            LayerSpec::Flatten => Ok(vec![element_count(input)?]),
            LayerSpec::Dense { units, .. } => {
                if input.len() != 1 {
                    return Err(Error::config(format!(
                        "dense layer expects a flat input, got {:?}; add a flatten layer first",
                        input
                    )));
                }
                if *units == 0 {
                    return Err(Error::config("dense layer needs at least one unit"));
                }
                Ok(vec![*units])
            }
        }
    }
}

impl LayerSpec {
    /// Number of persisted values this layer holds for a given input shape.
    /// Fails instead of overflowing on absurd shapes.
    pub fn param_count(&self, input: &[usize]) -> Result<usize> {
        let overflow = || Error::config(format!("parameter count of {:?} overflows", self));
        match self {
            LayerSpec::Conv2d { filters, kernel_size, .. } => {
                let channels = input.last().copied().unwrap_or(1);
                kernel_size
                    .checked_mul(*kernel_size)
                    .and_then(|n| n.checked_mul(channels))
                    .and_then(|n| n.checked_mul(*filters))
                    .and_then(|n| n.checked_add(*filters))
                    .ok_or_else(overflow)
            }
            // gamma, beta, moving mean and moving variance per channel.
            LayerSpec::BatchNorm { .. } => input
                .last()
                .copied()
                .unwrap_or(0)
                .checked_mul(4)
                .ok_or_else(overflow),
            LayerSpec::Dense { units, .. } => input
                .first()
                .copied()
                .unwrap_or(0)
                .checked_mul(*units)
                .and_then(|n| n.checked_add(*units))
                .ok_or_else(overflow),
            LayerSpec::MaxPool2d { .. } | LayerSpec::Dropout { .. } | LayerSpec::Flatten => Ok(0),
        }
    }
}

/// Product of the dimensions of `shape`, or a configuration error if it
/// does not fit in a `usize`.
pub fn element_count(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| Error::config(format!("shape {:?} has too many elements", shape)))
}

fn spatial(input: &[usize], layer: &str) -> Result<[usize; 3]> {
    match input {
        [h, w, c] => Ok([*h, *w, *c]),
        _ => Err(Error::config(format!(
            "{} expects a [height, width, channels] input, got {:?}",
            layer, input
        ))),
    }
}

/// The two topologies the digit classifier ships with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Plain conv/pool stack.
    Basic,
    /// Adds batch normalization and dropout (p = 0.25) in the middle.
    Regularized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
}

/// Optimizer, loss and tracked metrics a model is compiled with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileConfig {
    pub optimizer: RmsPropConfig,
    pub loss: LossType,
    pub metrics: Vec<Metric>,
}

impl Default for CompileConfig {
    fn default() -> Self {
        CompileConfig {
            optimizer: RmsPropConfig::default(),
            loss: LossType::CategoricalCrossEntropy,
            metrics: vec![Metric::Accuracy],
        }
    }
}

/// An immutable, fully serializable model topology.
///
/// Built once (usually through `ModelSpec::builder`) and then handed to
/// `Model::compile`, which allocates the parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Human-readable name used as the model file stem.
    pub name: String,
    /// Shape of one sample, without the batch dimension.
    pub input_shape: Vec<usize>,
    /// Ordered list of layer descriptions (input → output).
    pub layers: Vec<LayerSpec>,
}

impl ModelSpec {
    pub fn builder(name: impl Into<String>) -> ModelSpecBuilder {
        ModelSpecBuilder {
            spec: ModelSpec { name: name.into(), input_shape: Vec::new(), layers: Vec::new() },
        }
    }

    /// The fixed digit-classification topology:
    ///
    /// conv(16, 3×3, relu) → maxpool(2, 2) → conv(32, 3×3, relu)
    /// → [batchnorm → dropout(0.25)] → maxpool(2, 2) → conv(32, 3×3, relu)
    /// → [dropout(0.25)] → flatten → dense(64, relu) → dense(10, softmax)
    ///
    /// Bracketed layers are present only in `Variant::Regularized`.
    pub fn digit_classifier(variant: Variant) -> ModelSpec {
        let regularized = variant == Variant::Regularized;
        let name = match variant {
            Variant::Basic => "digit_cnn",
            Variant::Regularized => "digit_cnn_regularized",
        };

        let mut b = ModelSpec::builder(name)
            .input_shape(&DIGIT_INPUT_SHAPE)
            .conv2d(16, 3, ActivationFunction::ReLU)
            .max_pool2d(2, 2)
            .conv2d(32, 3, ActivationFunction::ReLU);
        if regularized {
            b = b.batch_norm().dropout(0.25);
        }
        b = b.max_pool2d(2, 2).conv2d(32, 3, ActivationFunction::ReLU);
        if regularized {
            b = b.dropout(0.25);
        }
        b.flatten()
            .dense(64, ActivationFunction::ReLU)
            .dense(NUM_CLASSES, ActivationFunction::Softmax)
            .spec
    }

    /// Output shape of every layer, in order. Fails on the first layer whose
    /// input does not fit.
    pub fn output_shapes(&self) -> Result<Vec<Vec<usize>>> {
        if self.input_shape.is_empty() || self.input_shape.contains(&0) {
            return Err(Error::config(format!("invalid input shape {:?}", self.input_shape)));
        }
        element_count(&self.input_shape)?;
        let mut shapes = Vec::with_capacity(self.layers.len());
        let mut current = self.input_shape.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            current = layer.output_shape(&current)
                .and_then(|shape| element_count(&shape).map(|_| shape))
                .map_err(|e| Error::config(format!("layer {}: {}", i, e)))?;
            shapes.push(current.clone());
        }
        Ok(shapes)
    }

    /// Total persisted values of the topology, computed without allocating.
    pub fn param_count(&self) -> Result<usize> {
        let shapes = self.output_shapes()?;
        let inputs = std::iter::once(&self.input_shape).chain(shapes.iter());
        self.layers.iter().zip(inputs).try_fold(0usize, |total, (layer, input)| {
            total
                .checked_add(layer.param_count(input)?)
                .ok_or_else(|| Error::config("parameter count overflows"))
        })
    }

    /// Shape of the final layer's output.
    pub fn output_shape(&self) -> Result<Vec<usize>> {
        Ok(self.output_shapes()?.pop().unwrap_or_else(|| self.input_shape.clone()))
    }

    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a `ModelSpec` from a JSON file.
    pub fn load_json(path: &str) -> Result<ModelSpec> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::load(format!("cannot open '{}': {}", path, e)))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| Error::load(format!("'{}' is not a model spec: {}", path, e)))
    }
}

/// Declarative layer stacking; `build()` validates the whole shape chain.
#[derive(Debug, Clone)]
pub struct ModelSpecBuilder {
    spec: ModelSpec,
}

impl ModelSpecBuilder {
    pub fn input_shape(mut self, shape: &[usize]) -> Self {
        self.spec.input_shape = shape.to_vec();
        self
    }

    pub fn conv2d(self, filters: usize, kernel_size: usize, activation: ActivationFunction) -> Self {
        self.layer(LayerSpec::Conv2d { filters, kernel_size, activation })
    }

    pub fn max_pool2d(self, pool_size: usize, stride: usize) -> Self {
        self.layer(LayerSpec::MaxPool2d { pool_size, stride })
    }

    pub fn batch_norm(self) -> Self {
        self.layer(LayerSpec::BatchNorm { momentum: DEFAULT_MOMENTUM, epsilon: DEFAULT_EPSILON })
    }

    pub fn dropout(self, rate: f64) -> Self {
        self.layer(LayerSpec::Dropout { rate })
    }

    pub fn flatten(self) -> Self {
        self.layer(LayerSpec::Flatten)
    }

    pub fn dense(self, units: usize, activation: ActivationFunction) -> Self {
        self.layer(LayerSpec::Dense { units, activation })
    }

    pub fn layer(mut self, layer: LayerSpec) -> Self {
        self.spec.layers.push(layer);
        self
    }

    pub fn build(self) -> Result<ModelSpec> {
        for layer in &self.spec.layers {
            if let LayerSpec::Dropout { rate } = layer {
                if !(0.0..1.0).contains(rate) {
                    return Err(Error::config(format!("dropout rate {} outside [0, 1)", rate)));
                }
            }
        }
        self.spec.output_shapes()?;
        Ok(self.spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_topology_shapes() {
        let spec = ModelSpec::digit_classifier(Variant::Basic);
        let shapes = spec.output_shapes().unwrap();
        assert_eq!(shapes, vec![
            vec![26, 26, 16],
            vec![13, 13, 16],
            vec![11, 11, 32],
            vec![5, 5, 32],
            vec![3, 3, 32],
            vec![288],
            vec![64],
            vec![10],
        ]);
    }

    #[test]
    fn regularized_variant_adds_three_layers() {
        let basic = ModelSpec::digit_classifier(Variant::Basic);
        let reg = ModelSpec::digit_classifier(Variant::Regularized);
        assert_eq!(reg.layers.len(), basic.layers.len() + 3);
        assert_eq!(reg.output_shape().unwrap(), vec![NUM_CLASSES]);
        assert!(matches!(reg.layers[3], LayerSpec::BatchNorm { .. }));
        assert_eq!(reg.layers[4], LayerSpec::Dropout { rate: 0.25 });
    }

    #[test]
    fn dense_before_flatten_is_rejected() {
        let err = ModelSpec::builder("bad")
            .input_shape(&DIGIT_INPUT_SHAPE)
            .dense(10, ActivationFunction::Softmax)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn oversized_kernel_is_rejected() {
        let err = ModelSpec::builder("bad")
            .input_shape(&[2, 2, 1])
            .conv2d(4, 3, ActivationFunction::ReLU)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn spec_roundtrips_through_json() {
        let spec = ModelSpec::digit_classifier(Variant::Regularized);
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"type\":\"conv2d\""));
        let back: ModelSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn param_count_matches_the_digit_topologies() {
        assert_eq!(ModelSpec::digit_classifier(Variant::Basic).param_count().unwrap(), 33_194);
        assert_eq!(ModelSpec::digit_classifier(Variant::Regularized).param_count().unwrap(), 33_322);
    }

    #[test]
    fn overflowing_shapes_are_configuration_errors() {
        let mut spec = ModelSpec::digit_classifier(Variant::Basic);
        spec.layers[0] = LayerSpec::Conv2d {
            filters: 1 << 62,
            kernel_size: 3,
            activation: ActivationFunction::ReLU,
        };
        assert!(matches!(spec.output_shapes(), Err(Error::Configuration(_))));
        assert!(matches!(spec.param_count(), Err(Error::Configuration(_))));

        let wide = ModelSpec { input_shape: vec![usize::MAX, 2, 1], ..ModelSpec::digit_classifier(Variant::Basic) };
        assert!(matches!(wide.output_shapes(), Err(Error::Configuration(_))));
    }
}
