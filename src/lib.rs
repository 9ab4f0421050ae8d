pub mod math;
pub mod activation;
pub mod layers;
pub mod loss;
pub mod optim;
pub mod metrics;
pub mod network;
pub mod train;
pub mod data;
pub mod inference;
pub mod config;
pub mod session;
pub mod error;

// Convenience re-exports
pub use math::tensor::Tensor;
pub use activation::activation::ActivationFunction;
pub use layers::Layer;
pub use network::{Model, ModelSpec, LayerSpec, CompileConfig, Variant, ModelMetadata, CLASS_NAMES};
pub use train::{fit, evaluate, FitConfig, History, Evaluation, EpochStats, TrainEvent};
pub use data::{Batch, MnistData};
pub use inference::{Classifier, Prediction, RawImage, Grayscale, preprocess, resize_bilinear};
pub use config::TrainingConfig;
pub use session::{Session, TrainReport};
pub use error::{Error, Result};
