use serde::{Serialize, Deserialize};

/// Per-epoch training statistics emitted by `fit`.
///
/// When a `progress_tx` channel is configured in `FitConfig`, the training
/// loop sends one `TrainEvent::EpochEnd` carrying this value at the end of
/// every epoch. The studio SSE handler forwards it as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Sample-weighted mean loss of the mini-batches in this epoch.
    pub loss: f64,
    /// Training accuracy as a fraction in [0, 1], measured on the batches
    /// as they were trained.
    pub accuracy: f64,
    /// Validation loss in inference mode, if a validation split was taken.
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
    /// Optimizer steps taken during this epoch.
    pub steps: usize,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}

/// Progress notifications sent over `FitConfig::progress_tx`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrainEvent {
    BatchEnd { epoch: usize, batch: usize, batches: usize, loss: f64, accuracy: f64 },
    EpochEnd(EpochStats),
}
