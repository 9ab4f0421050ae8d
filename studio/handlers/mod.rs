pub mod draw;
pub mod models;
pub mod train;
pub mod train_sse;
