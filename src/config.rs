use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::network::spec::Variant;
use crate::train::fit_config::FitConfig;

/// Everything a training run needs, loadable from a JSON file.
///
/// Missing fields fall back to the defaults of the regularized schedule, so
/// `{}` is a valid configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub variant: Variant,
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f64,
    pub shuffle: bool,
    /// Seeds parameter initialization, dropout masks and shuffling.
    pub seed: u64,
    /// Directory holding the four MNIST IDX files.
    pub data_dir: PathBuf,
    /// Where the topology JSON is written; weights land next to it.
    pub model_path: PathBuf,
    /// Train on the first `train_limit` samples only.
    pub train_limit: Option<usize>,
    pub test_limit: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig::for_variant(Variant::Regularized)
    }
}

impl TrainingConfig {
    /// Defaults with the fit schedule that belongs to `variant`.
    pub fn for_variant(variant: Variant) -> Self {
        let fit = match variant {
            Variant::Basic => FitConfig::basic(),
            Variant::Regularized => FitConfig::regularized(),
        };
        TrainingConfig {
            variant,
            epochs: fit.epochs,
            batch_size: fit.batch_size,
            validation_split: fit.validation_split,
            shuffle: fit.shuffle,
            seed: 42,
            data_dir: PathBuf::from("data/mnist"),
            model_path: PathBuf::from("trained_models/digit_cnn.json"),
            train_limit: None,
            test_limit: None,
        }
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<TrainingConfig> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::load(format!("cannot read '{}': {}", path.display(), e)))?;
        let config: TrainingConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::config("epochs must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(Error::config(format!(
                "validation_split {} outside [0, 1)",
                self.validation_split
            )));
        }
        Ok(())
    }

    /// The fit hyperparameters, without a progress channel.
    pub fn fit_config(&self) -> FitConfig {
        FitConfig {
            epochs: self.epochs,
            batch_size: self.batch_size,
            validation_split: self.validation_split,
            shuffle: self.shuffle,
            seed: self.seed,
            progress_tx: None,
        }
    }
}
