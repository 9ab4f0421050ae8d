pub mod batch;
pub mod idx;
pub mod mnist;

pub use batch::{Batch, one_hot};
pub use mnist::MnistData;

/// Divisor mapping 8-bit pixel values into `[0, 1]`. Shared by dataset
/// decoding and inference preprocessing so both see the same scale.
pub const PIXEL_SCALE: f64 = 255.0;
