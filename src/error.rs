use thiserror::Error;

/// Every failure the pipeline can report.
///
/// Nothing is retried internally; callers decide what to do (the studio
/// logs the error and leaves its page in the previous state).
#[derive(Error, Debug)]
pub enum Error {
    /// A shape or hyperparameter does not fit the declared topology.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation ran before the data or model it needs was ready.
    #[error("not ready: {0}")]
    NotReady(String),

    /// A dataset or persisted model could not be read or parsed.
    #[error("load error: {0}")]
    Load(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn not_ready(msg: impl Into<String>) -> Self {
        Error::NotReady(msg.into())
    }

    pub fn load(msg: impl Into<String>) -> Self {
        Error::Load(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
