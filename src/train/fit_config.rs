use std::sync::mpsc;

use crate::train::epoch_stats::TrainEvent;

/// Configuration for a `fit` run.
///
/// # Fields
/// - `epochs`          : full passes over the training split
/// - `batch_size`      : samples per optimizer step; the last batch of an
///                        epoch may be shorter
/// - `validation_split`: fraction in `[0, 1)` of the batch, taken from the
///                        end, held out for validation
/// - `shuffle`         : reshuffle the training indices every epoch
/// - `seed`            : seeds the shuffle order
/// - `progress_tx`     : optional channel; receives batch and epoch events.
///                        A dropped receiver does not stop training.
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f64,
    pub shuffle: bool,
    pub seed: u64,
    pub progress_tx: Option<mpsc::Sender<TrainEvent>>,
}

impl FitConfig {
    pub fn new(epochs: usize, batch_size: usize) -> Self {
        FitConfig {
            epochs,
            batch_size,
            validation_split: 0.0,
            shuffle: true,
            seed: 0,
            progress_tx: None,
        }
    }

    /// Schedule for the plain topology: 5 epochs of 512, 15 % validation.
    pub fn basic() -> Self {
        FitConfig { validation_split: 0.15, ..FitConfig::new(5, 512) }
    }

    /// Schedule for the regularized topology: 3 epochs of 128, 15 % validation.
    pub fn regularized() -> Self {
        FitConfig { validation_split: 0.15, ..FitConfig::new(3, 128) }
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<TrainEvent>) -> Self {
        self.progress_tx = Some(tx);
        self
    }
}
