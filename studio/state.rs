use std::sync::{Arc, Mutex, mpsc};
use digit_cnn::{EpochStats, Session, TrainEvent, TrainReport, Variant};

// ---------------------------------------------------------------------------
// Hyperparams
// ---------------------------------------------------------------------------

/// Values of the training form, remembered between page loads.
#[derive(Debug, Clone)]
pub struct Hyperparams {
    pub variant: Variant,
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: u64,
    pub train_limit: Option<usize>,
    pub test_limit: Option<usize>,
}

impl Default for Hyperparams {
    fn default() -> Self {
        let config = digit_cnn::TrainingConfig::default();
        Hyperparams {
            variant: config.variant,
            epochs: config.epochs,
            batch_size: config.batch_size,
            seed: config.seed,
            train_limit: Some(10_000),
            test_limit: Some(2_000),
        }
    }
}

// ---------------------------------------------------------------------------
// Training status
// ---------------------------------------------------------------------------

pub enum TrainingStatus {
    /// No training has been started yet.
    Idle,
    /// Training is running in a background thread, which owns the session
    /// until it finishes.
    Running {
        event_rx:     Arc<Mutex<mpsc::Receiver<TrainEvent>>>,
        total_epochs: usize,
    },
    /// Training completed and the model was saved.
    Done {
        model_path:       String,
        elapsed_total_ms: u64,
    },
    /// Training or saving failed; the session is back in its prior state.
    Failed {
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Flash messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum FlashKind { Success, Error }

#[derive(Debug, Clone)]
pub struct FlashMessage {
    pub kind: FlashKind,
    pub text: String,
}

impl FlashMessage {
    pub fn success(text: impl Into<String>) -> Self {
        FlashMessage { kind: FlashKind::Success, text: text.into() }
    }
    pub fn error(text: impl Into<String>) -> Self {
        FlashMessage { kind: FlashKind::Error, text: text.into() }
    }
}

// ---------------------------------------------------------------------------
// Main state struct
// ---------------------------------------------------------------------------

pub struct StudioState {
    /// Dataset and active model. Emptied while a training run holds it.
    pub session:       Session,
    /// Where the dataset was loaded from, for display.
    pub data_dir:      Option<String>,
    pub hyperparams:   Hyperparams,
    /// Current training lifecycle state.
    pub training:      TrainingStatus,
    /// Epoch stats of the most recent training run.
    pub epoch_history: Vec<EpochStats>,
    /// Test-set report of the most recent finished run.
    pub report:        Option<TrainReport>,
    /// One-shot flash message for the next page render.
    pub flash:         Option<FlashMessage>,
}

impl StudioState {
    pub fn new() -> Self {
        StudioState {
            session:       Session::new(),
            data_dir:      None,
            hyperparams:   Hyperparams::default(),
            training:      TrainingStatus::Idle,
            epoch_history: Vec::new(),
            report:        None,
            flash:         None,
        }
    }

    pub fn is_training(&self) -> bool {
        matches!(self.training, TrainingStatus::Running { .. })
    }

    /// Takes and returns the current flash message, clearing it.
    pub fn take_flash(&mut self) -> Option<FlashMessage> {
        self.flash.take()
    }
}

/// Shared state type: an `Arc<Mutex<StudioState>>` passed to every handler.
pub type SharedState = Arc<Mutex<StudioState>>;
