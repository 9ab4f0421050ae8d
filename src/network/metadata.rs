use serde::{Deserialize, Serialize};

use crate::network::spec::{DIGIT_INPUT_SHAPE, NUM_CLASSES};

/// Display names for the ten digit classes, indexed by label.
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "Zero", "One", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight", "Nine",
];

/// Describes how to interpret the input fed to a model.
/// Stored in the model JSON; the studio reads it to size the drawing canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputType {
    /// Grayscale image resized to width×height, normalized to [0, 1].
    ImageGrayscale { width: u32, height: u32 },
}

/// Optional annotations attached to a saved model.
/// All fields are Option<> so older artifacts without metadata deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelMetadata {
    pub description: Option<String>,
    pub input_type: Option<InputType>,
    /// Human-readable class labels for the output layer.
    pub output_labels: Option<Vec<String>>,
}

impl ModelMetadata {
    /// Metadata for a digit classifier: 28×28 grayscale in, "Zero".."Nine" out.
    pub fn digits() -> ModelMetadata {
        ModelMetadata {
            description: Some("MNIST handwritten digit classifier".to_owned()),
            input_type: Some(InputType::ImageGrayscale {
                width: DIGIT_INPUT_SHAPE[1] as u32,
                height: DIGIT_INPUT_SHAPE[0] as u32,
            }),
            output_labels: Some(CLASS_NAMES.iter().map(|s| s.to_string()).collect()),
        }
    }
}
