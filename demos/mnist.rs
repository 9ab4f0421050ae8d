/// MNIST digit classification demo for digit-cnn.
///
/// Architecture: conv(16) → pool → conv(32) → pool → conv(32) → dense(64) → dense(10)
/// Loss:         categorical cross-entropy (combined with Softmax)
/// Optimizer:    RMSProp, lr = 0.001
/// Schedule:     5 epochs of 512, 15 % validation (the basic variant)
///
/// Run with:
///   cargo run --example mnist --release -- [DATA_DIR] [TRAIN_LIMIT]
///
/// DATA_DIR defaults to `data/mnist` and must hold the four IDX files.

use std::io::{self, Write};
use std::sync::mpsc;
use std::thread;

use anyhow::{Context, Result};

use digit_cnn::{
    evaluate, fit, Classifier, CompileConfig, FitConfig, MnistData, Model, ModelMetadata,
    ModelSpec, RawImage, TrainEvent, Variant,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = std::env::args().skip(1);
    let data_dir = args.next().unwrap_or_else(|| "data/mnist".to_owned());
    let train_limit = args.next().map(|s| s.parse::<usize>()).transpose()?;

    // --- Load data ---
    println!("Loading MNIST data from {}...", data_dir);
    let data = MnistData::load(&data_dir).with_context(|| format!("loading {}", data_dir))?;
    let train = data.train_data(train_limit)?;
    let test = data.test_data(None)?;
    println!("  Training set: {} images", train.len());
    println!("  Test set:     {} images", test.len());

    // --- Build model ---
    let mut model = Model::compile(ModelSpec::digit_classifier(Variant::Basic), CompileConfig::default(), 7)?;
    model.metadata = Some(ModelMetadata::digits());
    println!("\n{}", model.summary());

    // --- Train, printing a dot per batch and a line per epoch ---
    let (tx, rx) = mpsc::channel();
    let printer = thread::spawn(move || {
        for event in rx {
            match event {
                TrainEvent::BatchEnd { .. } => {
                    print!(".");
                    let _ = io::stdout().flush();
                }
                TrainEvent::EpochEnd(s) => println!(
                    "\nEpoch {:>2}/{}: loss {:.4}, acc {:.2}%, val_loss {:.4}, val_acc {:.2}% ({:.1}s)",
                    s.epoch,
                    s.total_epochs,
                    s.loss,
                    s.accuracy * 100.0,
                    s.val_loss.unwrap_or(f64::NAN),
                    s.val_accuracy.unwrap_or(f64::NAN) * 100.0,
                    s.elapsed_ms as f64 / 1000.0,
                ),
            }
        }
    });
    let config = FitConfig::basic().with_progress(tx);
    println!("Training for {} epochs...", config.epochs);
    fit(&mut model, &train, &config)?;
    drop(config);
    let _ = printer.join();

    // --- Evaluate ---
    let eval = evaluate(&model, &test)?;
    println!("\nTest accuracy: {:.2}% (loss {:.4})", eval.accuracy * 100.0, eval.loss);

    // --- Save, reload and classify the first test digit as a canvas image ---
    let path = "trained_models/mnist_demo.json";
    model.save(path)?;
    let classifier = Classifier::load(path)?;

    let first = test.slice(0, 1);
    let pixels: Vec<u8> = first
        .images()
        .data
        .iter()
        .flat_map(|&v| {
            let p = (v * 255.0).round() as u8;
            [p, p, p, 255]
        })
        .collect();
    let image = RawImage::from_rgba(28, 28, pixels)?;
    let prediction = classifier.classify(&image)?;
    println!(
        "First test digit: labelled {}, predicted {} ({:.1}%)",
        first.classes()[0],
        prediction.class_name,
        prediction.ranking[0].1 * 100.0
    );
    Ok(())
}
