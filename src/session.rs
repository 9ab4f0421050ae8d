use std::path::Path;

use log::{error, info};
use serde::{Serialize, Deserialize};

use crate::data::mnist::MnistData;
use crate::error::{Error, Result};
use crate::inference::classifier::{class_names_for, classify_with, Prediction};
use crate::inference::preprocess::Grayscale;
use crate::inference::preprocess::RawImage;
use crate::metrics;
use crate::network::metadata::ModelMetadata;
use crate::network::model::Model;
use crate::network::spec::{CompileConfig, ModelSpec, Variant, NUM_CLASSES};
use crate::train::fit_config::FitConfig;
use crate::train::loop_fn::{evaluate, fit, Evaluation, History};

/// Results of `Session::train`: the fit history plus a test-set evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub history: History,
    pub test: Evaluation,
    /// Accuracy per true digit; `None` for digits absent from the test set.
    pub per_class_accuracy: Vec<Option<f64>>,
    /// `confusion[label][prediction]` counts over the test set.
    pub confusion: Vec<Vec<usize>>,
}

/// The single owner of the dataset and the active model.
///
/// Every operation that needs one of them fails with `Error::NotReady`
/// until it has been provided. Failures are logged and leave the session
/// unchanged.
#[derive(Debug, Default)]
pub struct Session {
    data: Option<MnistData>,
    model: Option<Model>,
    train_limit: Option<usize>,
    test_limit: Option<usize>,
}

impl Session {
    pub fn new() -> Session {
        Session::default()
    }

    /// Truncates the splits used by `train`.
    pub fn with_limits(mut self, train: Option<usize>, test: Option<usize>) -> Session {
        self.train_limit = train;
        self.test_limit = test;
        self
    }

    pub fn load_data(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let data = MnistData::load(dir).inspect_err(|e| error!("dataset load failed: {}", e))?;
        self.data = Some(data);
        Ok(())
    }

    pub fn set_data(&mut self, data: MnistData) {
        self.data = Some(data);
    }

    pub fn data(&self) -> Option<&MnistData> {
        self.data.as_ref()
    }

    /// Builds and compiles the digit topology. Replaces any previous model.
    pub fn build_model(&mut self, variant: Variant, seed: u64) -> Result<&Model> {
        let mut model = Model::compile(ModelSpec::digit_classifier(variant), CompileConfig::default(), seed)?;
        model.metadata = Some(ModelMetadata::digits());
        info!("\n{}", model.summary());
        Ok(self.model.insert(model))
    }

    pub fn set_model(&mut self, model: Model) {
        self.model = Some(model);
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// Takes the model out of the session, leaving it not ready.
    pub fn take_model(&mut self) -> Option<Model> {
        self.model.take()
    }

    pub fn load_model(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let model = Model::load(path).inspect_err(|e| error!("model load failed: {}", e))?;
        self.model = Some(model);
        Ok(())
    }

    /// Fits the model on the training split, then evaluates it on the test
    /// split.
    pub fn train(&mut self, config: &FitConfig) -> Result<TrainReport> {
        let data = self.data.as_ref().ok_or_else(|| Error::not_ready("dataset not loaded"))?;
        let model = self.model.as_mut().ok_or_else(|| Error::not_ready("model not built"))?;

        let train = data.train_data(self.train_limit)?;
        let test = data.test_data(self.test_limit)?;
        let history = fit(model, &train, config).inspect_err(|e| error!("training failed: {}", e))?;
        let test_eval = evaluate(model, &test)?;

        let labels = test.classes();
        let predictions = model.predict(test.images())?.argmax_rows();
        let report = TrainReport {
            history,
            test: test_eval,
            per_class_accuracy: metrics::per_class_accuracy(&labels, &predictions, NUM_CLASSES),
            confusion: metrics::confusion_matrix(&labels, &predictions, NUM_CLASSES),
        };
        info!("test accuracy: {:.1}%", report.test.accuracy * 100.0);
        Ok(report)
    }

    pub fn save_model(&self, path: impl AsRef<Path>) -> Result<()> {
        self.model
            .as_ref()
            .ok_or_else(|| Error::not_ready("no model to save"))?
            .save(path)
    }

    /// Classifies one canvas image with the current model.
    pub fn predict(&self, image: &RawImage) -> Result<Prediction> {
        let model = self.model.as_ref().ok_or_else(|| Error::not_ready("model not built"))?;
        classify_with(model, &class_names_for(model), Grayscale::default(), image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_before_setup_are_not_ready() {
        let mut session = Session::new();
        assert!(matches!(session.train(&FitConfig::basic()), Err(Error::NotReady(_))));
        assert!(matches!(session.save_model("unused.json"), Err(Error::NotReady(_))));
        let image = RawImage::from_rgba(1, 1, vec![0, 0, 0, 255]).unwrap();
        assert!(matches!(session.predict(&image), Err(Error::NotReady(_))));

        session.build_model(Variant::Basic, 1).unwrap();
        assert!(matches!(session.train(&FitConfig::basic()), Err(Error::NotReady(_))));
        assert!(session.predict(&image).is_ok());
    }

    #[test]
    fn failed_load_keeps_previous_model() {
        let mut session = Session::new();
        session.build_model(Variant::Basic, 1).unwrap();
        assert!(session.load_model("/nonexistent/model.json").is_err());
        assert!(session.model().is_some());
    }
}
