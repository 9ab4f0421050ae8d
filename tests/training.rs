use std::sync::mpsc;

use rand::{rngs::StdRng, Rng, SeedableRng};

use digit_cnn::{
    fit, Batch, CompileConfig, Error, FitConfig, Model, ModelMetadata, ModelSpec, Session,
    Tensor, TrainEvent, Variant,
};

/// `n` random 28×28 images in [0, 1] with labels cycling through the digits.
fn synthetic_digits(n: usize, seed: u64) -> Batch {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f64> = (0..n * 28 * 28).map(|_| rng.gen_range(0.0..1.0)).collect();
    let images = Tensor::from_vec(&[n, 28, 28, 1], data).unwrap();
    let classes: Vec<u8> = (0..n).map(|i| (i % 10) as u8).collect();
    Batch::from_classes(images, &classes, 10).unwrap()
}

fn basic_model(seed: u64) -> Model {
    let mut model =
        Model::compile(ModelSpec::digit_classifier(Variant::Basic), CompileConfig::default(), seed).unwrap();
    model.metadata = Some(ModelMetadata::digits());
    model
}

#[test_log::test]
fn one_full_batch_is_one_step_per_epoch() {
    let data = synthetic_digits(512, 1);
    let mut model = basic_model(3);
    let history = fit(&mut model, &data, &FitConfig::new(1, 512)).unwrap();
    assert_eq!(history.steps, 1);
    assert_eq!(model.iterations(), 1);
    assert!(history.epochs[0].val_loss.is_none());
}

#[test_log::test]
fn held_out_samples_do_not_add_steps() {
    let data = synthetic_digits(512, 2);
    let mut model = basic_model(3);
    let config = FitConfig { validation_split: 0.15, ..FitConfig::new(1, 512) };
    let history = fit(&mut model, &data, &config).unwrap();

    // floor(512 * 0.15) = 76 held out, 436 trained in a single batch.
    assert_eq!(history.steps, 1);
    let stats = history.last().unwrap();
    assert!(stats.val_loss.is_some_and(f64::is_finite));
    assert!(stats.val_accuracy.is_some_and(|a| (0.0..=1.0).contains(&a)));
}

#[test_log::test]
fn progress_events_arrive_in_order() {
    let data = synthetic_digits(40, 4);
    let mut model = basic_model(5);
    let (tx, rx) = mpsc::channel();
    let config = FitConfig::new(2, 16).with_progress(tx);
    fit(&mut model, &data, &config).unwrap();
    drop(config);

    let events: Vec<TrainEvent> = rx.iter().collect();
    // 3 batches (16, 16, 8) then an epoch marker, twice.
    assert_eq!(events.len(), 8);
    for (i, event) in events.iter().enumerate() {
        match (i % 4, event) {
            (3, TrainEvent::EpochEnd(stats)) => assert_eq!(stats.steps, 3),
            (b, TrainEvent::BatchEnd { batch, batches, .. }) => {
                assert_eq!(*batch, b + 1);
                assert_eq!(*batches, 3);
            }
            _ => panic!("unexpected event {:?} at {}", event, i),
        }
    }
}

#[test_log::test]
fn session_trains_and_reports() {
    let mut session = Session::new();
    session.build_model(Variant::Basic, 9).unwrap();
    assert!(matches!(session.train(&FitConfig::new(1, 32)), Err(Error::NotReady(_))));

    let data = digit_cnn::MnistData::from_bytes(
        idx3(&synthetic_digits(64, 6)),
        idx1(64),
        idx3(&synthetic_digits(20, 7)),
        idx1(20),
    );
    session.set_data(data);
    let report = session.train(&FitConfig::new(1, 32)).unwrap();

    assert_eq!(report.history.steps, 2);
    assert!((0.0..=1.0).contains(&report.test.accuracy));
    assert_eq!(report.confusion.len(), 10);
    assert_eq!(report.confusion.iter().flatten().sum::<usize>(), 20);
    assert!(report.per_class_accuracy.iter().all(|a| a.is_some()));
}

/// Encodes a batch's images as an IDX3 file of bytes.
fn idx3(batch: &Batch) -> Vec<u8> {
    let mut bytes = vec![0, 0, 0x08, 0x03];
    for dim in [batch.len() as u32, 28, 28] {
        bytes.extend_from_slice(&dim.to_be_bytes());
    }
    bytes.extend(batch.images().data.iter().map(|&v| (v * 255.0).round() as u8));
    bytes
}

/// IDX1 labels cycling through the digits, matching `synthetic_digits`.
fn idx1(n: usize) -> Vec<u8> {
    let mut bytes = vec![0, 0, 0x08, 0x01];
    bytes.extend_from_slice(&(n as u32).to_be_bytes());
    bytes.extend((0..n).map(|i| (i % 10) as u8));
    bytes
}
