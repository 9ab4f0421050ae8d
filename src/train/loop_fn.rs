use std::time::Instant;

use log::{debug, info};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Serialize, Deserialize};

use crate::data::batch::Batch;
use crate::error::{Error, Result};
use crate::metrics;
use crate::network::model::Model;
use crate::train::epoch_stats::{EpochStats, TrainEvent};
use crate::train::fit_config::FitConfig;

/// Everything `fit` observed, one entry per completed epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<EpochStats>,
    /// Optimizer steps taken across the whole run.
    pub steps: usize,
}

impl History {
    pub fn last(&self) -> Option<&EpochStats> {
        self.epochs.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Trains `model` on `data` for `config.epochs` epochs.
///
/// The trailing `floor(len * validation_split)` samples are held out and only
/// ever seen in inference mode at the end of each epoch. The remaining
/// samples are (optionally) shuffled every epoch and cut into mini-batches;
/// each mini-batch is one optimizer step.
///
/// # Errors
/// `Error::Configuration` if `data` is empty, `batch_size == 0`, the split
/// is outside `[0, 1)`, nothing is left to train on after the split, or the
/// data does not match the model's input/output shape.
pub fn fit(model: &mut Model, data: &Batch, config: &FitConfig) -> Result<History> {
    if data.is_empty() {
        return Err(Error::config("cannot fit on an empty batch"));
    }
    if config.batch_size == 0 {
        return Err(Error::config("batch_size must be at least 1"));
    }
    if !(0.0..1.0).contains(&config.validation_split) {
        return Err(Error::config(format!(
            "validation_split {} outside [0, 1)",
            config.validation_split
        )));
    }

    let n = data.len();
    let n_val = (n as f64 * config.validation_split).floor() as usize;
    let n_train = n - n_val;
    if n_train == 0 {
        return Err(Error::config(format!(
            "validation_split {} leaves no training samples out of {}",
            config.validation_split, n
        )));
    }
    let train = data.slice(0, n_train);
    let validation = (n_val > 0).then(|| data.slice(n_train, n));
    model.check_input(train.images())?;

    let batches = n_train.div_ceil(config.batch_size);
    info!(
        "fitting '{}' on {} samples ({} validation), {} epochs of {} batches",
        model.spec.name, n_train, n_val, config.epochs, batches
    );

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut indices: Vec<usize> = (0..n_train).collect();
    let mut history = History::default();

    for epoch in 1..=config.epochs {
        let t_start = Instant::now();
        if config.shuffle {
            indices.shuffle(&mut rng);
        }

        // ── One full pass over the training split ──────────────────────────
        let mut loss_sum = 0.0;
        let mut acc_sum = 0.0;
        let mut steps = 0;
        for (batch, chunk) in indices.chunks(config.batch_size).enumerate() {
            let mini = train.gather(chunk);
            let (loss, accuracy) = model.train_on_batch(mini.images(), mini.labels())?;
            loss_sum += loss * chunk.len() as f64;
            acc_sum += accuracy * chunk.len() as f64;
            steps += 1;
            send(config, TrainEvent::BatchEnd { epoch, batch: batch + 1, batches, loss, accuracy });
        }
        history.steps += steps;

        // ── Validation ────────────────────────────────────────────────────
        let val = match &validation {
            Some(v) => Some(evaluate(model, v)?),
            None => None,
        };

        let stats = EpochStats {
            epoch,
            total_epochs: config.epochs,
            loss: loss_sum / n_train as f64,
            accuracy: acc_sum / n_train as f64,
            val_loss: val.map(|v| v.loss),
            val_accuracy: val.map(|v| v.accuracy),
            steps,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        info!(
            "epoch {}/{}: loss {:.4}, acc {:.4}{} ({} ms)",
            epoch,
            config.epochs,
            stats.loss,
            stats.accuracy,
            match val {
                Some(v) => format!(", val_loss {:.4}, val_acc {:.4}", v.loss, v.accuracy),
                None => String::new(),
            },
            stats.elapsed_ms
        );
        send(config, TrainEvent::EpochEnd(stats.clone()));
        history.epochs.push(stats);
    }

    Ok(history)
}

/// Mean loss and accuracy of `model` on `data`, in inference mode.
pub fn evaluate(model: &Model, data: &Batch) -> Result<Evaluation> {
    if data.is_empty() {
        return Err(Error::config("cannot evaluate on an empty batch"));
    }
    let output = model.predict(data.images())?;
    if output.shape != data.labels().shape {
        return Err(Error::config(format!(
            "model output {:?} does not match labels {:?}",
            output.shape,
            data.labels().shape
        )));
    }
    Ok(Evaluation {
        loss: model.compile.loss.loss(&output, data.labels()),
        accuracy: metrics::accuracy(&output.argmax_rows(), &data.classes()),
    })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn send(config: &FitConfig, event: TrainEvent) {
    if let Some(ref tx) = config.progress_tx {
        // Training runs to completion even when nobody is listening.
        if tx.send(event).is_err() {
            debug!("progress receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::math::tensor::Tensor;
    use crate::network::spec::{CompileConfig, ModelSpec};
    use std::sync::mpsc;

    fn tiny_model() -> Model {
        let spec = ModelSpec::builder("tiny")
            .input_shape(&[2, 2, 1])
            .flatten()
            .dense(2, ActivationFunction::Softmax)
            .build()
            .unwrap();
        Model::compile(spec, CompileConfig::default(), 3).unwrap()
    }

    fn tiny_batch(n: usize) -> Batch {
        let images = Tensor::from_vec(
            &[n, 2, 2, 1],
            (0..n * 4).map(|i| if (i / 4) % 2 == 0 { 1.0 } else { 0.0 }).collect(),
        )
        .unwrap();
        let classes: Vec<u8> = (0..n).map(|i| (i % 2) as u8).collect();
        Batch::from_classes(images, &classes, 2).unwrap()
    }

    #[test]
    fn short_last_batch_is_still_a_step() {
        let mut model = tiny_model();
        let history = fit(&mut model, &tiny_batch(10), &FitConfig::new(2, 4)).unwrap();
        assert_eq!(history.epochs.len(), 2);
        assert_eq!(history.epochs[0].steps, 3);
        assert_eq!(history.steps, 6);
        assert_eq!(model.iterations(), 6);
    }

    #[test]
    fn validation_split_takes_trailing_samples() {
        let mut model = tiny_model();
        let config = FitConfig { validation_split: 0.25, ..FitConfig::new(1, 100) };
        let history = fit(&mut model, &tiny_batch(8), &config).unwrap();
        let stats = &history.epochs[0];
        assert_eq!(stats.steps, 1);
        assert!(stats.val_loss.is_some());
        assert!(stats.val_accuracy.is_some());
    }

    fn weights_of(model: &Model) -> Vec<f64> {
        model.layers.iter()
            .flat_map(|l| l.weights().into_iter().flat_map(|(_, t)| t.data.clone()))
            .collect()
    }

    #[test]
    fn held_out_tail_never_reaches_the_optimizer() {
        let n = 12;
        let images = Tensor::from_vec(
            &[n, 2, 2, 1],
            (0..n * 4).map(|i| ((i * 7) % 13) as f64 / 13.0).collect(),
        )
        .unwrap();
        let classes: Vec<u8> = (0..n).map(|i| (i * 5 % 3 % 2) as u8).collect();
        let data = Batch::from_classes(images, &classes, 2).unwrap();
        let schedule = FitConfig { seed: 5, ..FitConfig::new(3, 4) };

        // 12 * 0.25 = 3 trailing samples held out.
        let mut split = tiny_model();
        fit(&mut split, &data, &FitConfig { validation_split: 0.25, ..schedule.clone() }).unwrap();

        let mut head = tiny_model();
        fit(&mut head, &data.slice(0, 9), &schedule).unwrap();
        assert_eq!(weights_of(&split), weights_of(&head));

        let mut tail = tiny_model();
        fit(&mut tail, &data.slice(3, 12), &schedule).unwrap();
        assert_ne!(weights_of(&split), weights_of(&tail));
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let mut model = tiny_model();
        let data = tiny_batch(4);
        let zero_batch = FitConfig::new(1, 0);
        assert!(matches!(fit(&mut model, &data, &zero_batch), Err(Error::Configuration(_))));
        let bad_split = FitConfig { validation_split: 1.0, ..FitConfig::new(1, 2) };
        assert!(matches!(fit(&mut model, &data, &bad_split), Err(Error::Configuration(_))));
        assert_eq!(model.iterations(), 0);
    }

    #[test]
    fn split_size_rounds_down() {
        let mut model = tiny_model();
        let config = FitConfig { validation_split: 0.9, ..FitConfig::new(1, 2) };
        let history = fit(&mut model, &tiny_batch(1), &config).unwrap();
        assert_eq!(history.epochs[0].val_loss, None);
        assert_eq!(model.iterations(), 1);
    }

    #[test]
    fn progress_events_arrive_in_order() {
        let mut model = tiny_model();
        let (tx, rx) = mpsc::channel();
        let config = FitConfig::new(2, 8).with_progress(tx);
        fit(&mut model, &tiny_batch(8), &config).unwrap();
        drop(config);
        let events: Vec<TrainEvent> = rx.iter().collect();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], TrainEvent::BatchEnd { epoch: 1, batch: 1, batches: 1, .. }));
        match &events[3] {
            TrainEvent::EpochEnd(stats) => assert_eq!(stats.epoch, 2),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn same_seed_same_history() {
        let run = || {
            let mut model = tiny_model();
            let config = FitConfig { seed: 11, ..FitConfig::new(3, 3) };
            fit(&mut model, &tiny_batch(9), &config).unwrap()
        };
        assert_eq!(run().epochs.iter().map(|e| e.loss).collect::<Vec<_>>(),
                   run().epochs.iter().map(|e| e.loss).collect::<Vec<_>>());
    }

    #[test]
    fn evaluate_reports_accuracy_fraction() {
        let model = tiny_model();
        let eval = evaluate(&model, &tiny_batch(6)).unwrap();
        assert!(eval.loss.is_finite());
        assert!((0.0..=1.0).contains(&eval.accuracy));
    }
}
