use std::path::Path;

use log::debug;
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::inference::preprocess::{preprocess_with, Grayscale, RawImage};
use crate::network::metadata::CLASS_NAMES;
use crate::network::model::Model;
use crate::network::spec::{DIGIT_INPUT_SHAPE, NUM_CLASSES};

/// Outcome of one classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Softmax output, one entry per digit; sums to 1.
    pub probabilities: [f64; NUM_CLASSES],
    /// Most probable digit (lowest index on ties).
    pub label: usize,
    pub class_name: String,
    /// `(digit, probability)` sorted from most to least probable.
    pub ranking: Vec<(usize, f64)>,
}

impl Prediction {
    pub fn from_probabilities(probabilities: [f64; NUM_CLASSES], class_names: &[String]) -> Prediction {
        let mut ranking: Vec<(usize, f64)> = probabilities.iter().copied().enumerate().collect();
        // Stable sort keeps the lower digit first on equal probabilities.
        ranking.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let label = ranking[0].0;
        Prediction {
            probabilities,
            label,
            class_name: class_names.get(label).cloned().unwrap_or_else(|| label.to_string()),
            ranking,
        }
    }
}

/// A loaded digit model, frozen for inference.
///
/// `classify` only borrows the model immutably; every intermediate tensor is
/// owned by the call and dropped before it returns.
#[derive(Debug, Clone)]
pub struct Classifier {
    model: Model,
    class_names: Vec<String>,
    grayscale: Grayscale,
}

impl Classifier {
    /// Wraps `model` after checking it takes `[28, 28, 1]` inputs and
    /// produces ten outputs.
    pub fn new(model: Model) -> Result<Classifier> {
        check_digit_model(&model)?;
        let class_names = class_names_for(&model);
        Ok(Classifier { model, class_names, grayscale: Grayscale::default() })
    }

    /// Loads a saved model and validates it as `new` does.
    pub fn load(path: impl AsRef<Path>) -> Result<Classifier> {
        Classifier::new(Model::load(path)?)
    }

    pub fn with_grayscale(mut self, grayscale: Grayscale) -> Self {
        self.grayscale = grayscale;
        self
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn classify(&self, image: &RawImage) -> Result<Prediction> {
        classify_with(&self.model, &self.class_names, self.grayscale, image)
    }
}

/// Fails with `Error::Configuration` unless `model` maps `[28, 28, 1]`
/// inputs to ten outputs.
pub fn check_digit_model(model: &Model) -> Result<()> {
    if model.input_shape() != DIGIT_INPUT_SHAPE {
        return Err(Error::config(format!(
            "model '{}' takes {:?} inputs, digits need {:?}",
            model.spec.name,
            model.input_shape(),
            DIGIT_INPUT_SHAPE
        )));
    }
    if model.output_units() != NUM_CLASSES {
        return Err(Error::config(format!(
            "model '{}' has {} outputs, digits need {}",
            model.spec.name,
            model.output_units(),
            NUM_CLASSES
        )));
    }
    Ok(())
}

/// Output labels from the model metadata, or "Zero".."Nine".
pub fn class_names_for(model: &Model) -> Vec<String> {
    model
        .metadata
        .as_ref()
        .and_then(|m| m.output_labels.clone())
        .filter(|labels| labels.len() == NUM_CLASSES)
        .unwrap_or_else(|| CLASS_NAMES.iter().map(|s| s.to_string()).collect())
}

/// One inference pass over a borrowed model. Models that are not
/// `[28, 28, 1]` to ten outputs fail with `Error::Configuration`.
pub fn classify_with(
    model: &Model,
    class_names: &[String],
    grayscale: Grayscale,
    image: &RawImage,
) -> Result<Prediction> {
    check_digit_model(model)?;
    let input = preprocess_with(image, grayscale)?;
    let output = model.predict(&input)?;
    let mut probabilities = [0.0; NUM_CLASSES];
    probabilities.copy_from_slice(&output.data[..NUM_CLASSES]);
    let prediction = Prediction::from_probabilities(probabilities, class_names);
    debug!(
        "classified {}x{} image as {} ({:.3})",
        image.width(),
        image.height(),
        prediction.class_name,
        prediction.ranking[0].1
    );
    Ok(prediction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::network::spec::{CompileConfig, ModelSpec, Variant};

    fn classifier() -> Classifier {
        let model = Model::compile(
            ModelSpec::digit_classifier(Variant::Regularized), CompileConfig::default(), 21,
        ).unwrap();
        Classifier::new(model).unwrap()
    }

    fn canvas(value: u8) -> RawImage {
        RawImage::from_rgba(280, 280, [value, value, value, 255].repeat(280 * 280)).unwrap()
    }

    #[test]
    fn black_canvas_gives_a_distribution() {
        let p = classifier().classify(&canvas(0)).unwrap();
        assert_eq!(p.probabilities.len(), 10);
        assert!(p.probabilities.iter().all(|v| v.is_finite() && *v >= 0.0));
        assert!((p.probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-5);
        assert_eq!(p.ranking.len(), 10);
        assert_eq!(p.ranking[0].0, p.label);
        assert_eq!(p.class_name, CLASS_NAMES[p.label]);
    }

    #[test]
    fn classification_is_deterministic() {
        let c = classifier();
        assert_eq!(c.classify(&canvas(200)).unwrap(), c.classify(&canvas(200)).unwrap());
    }

    #[test]
    fn ranking_is_sorted_descending() {
        let mut probs = [0.0; 10];
        probs[3] = 0.5;
        probs[7] = 0.3;
        probs[1] = 0.2;
        let names: Vec<String> = CLASS_NAMES.iter().map(|s| s.to_string()).collect();
        let p = Prediction::from_probabilities(probs, &names);
        assert_eq!(p.label, 3);
        assert_eq!(p.class_name, "Three");
        assert_eq!(&p.ranking[..3], &[(3, 0.5), (7, 0.3), (1, 0.2)]);
    }

    #[test]
    fn non_digit_models_are_rejected() {
        let spec = ModelSpec::builder("wide")
            .input_shape(&[28, 28, 1])
            .flatten()
            .dense(5, ActivationFunction::Softmax)
            .build()
            .unwrap();
        let model = Model::compile(spec, CompileConfig::default(), 0).unwrap();
        let names: Vec<String> = CLASS_NAMES.iter().map(|s| s.to_string()).collect();
        let err = classify_with(&model, &names, Grayscale::default(), &canvas(0)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(matches!(Classifier::new(model), Err(Error::Configuration(_))));
    }
}
