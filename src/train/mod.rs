pub mod epoch_stats;
pub mod fit_config;
pub mod loop_fn;

pub use epoch_stats::{EpochStats, TrainEvent};
pub use fit_config::FitConfig;
pub use loop_fn::{evaluate, fit, Evaluation, History};
