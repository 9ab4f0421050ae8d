pub mod metadata;
pub mod model;
pub mod persist;
pub mod spec;

pub use metadata::{ModelMetadata, InputType, CLASS_NAMES};
pub use model::Model;
pub use spec::{ModelSpec, ModelSpecBuilder, LayerSpec, CompileConfig, Variant, Metric};
