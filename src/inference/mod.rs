pub mod classifier;
pub mod preprocess;

pub use classifier::{Classifier, Prediction};
pub use preprocess::{preprocess, preprocess_with, resize_bilinear, Grayscale, RawImage};
