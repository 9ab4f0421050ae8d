//! Command-line front end: train a digit model, classify image files, or
//! print a topology summary.
//!
//! ```text
//! digit-cnn train   [--config FILE] [--variant basic|regularized] [--epochs N]
//!                   [--batch-size N] [--seed N] [--data DIR] [--out FILE.json]
//!                   [--train-limit N] [--test-limit N]
//! digit-cnn predict --model FILE.json [--luminance] IMAGE...
//! digit-cnn summary [--variant basic|regularized]
//! ```

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use log::info;

use digit_cnn::{
    Classifier, CompileConfig, Grayscale, Model, ModelSpec, RawImage, Session, TrainingConfig,
    Variant, CLASS_NAMES,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "help".to_owned());
    let rest: Vec<String> = args.collect();

    match command.as_str() {
        "train" => train(&rest),
        "predict" => predict(&rest),
        "summary" => summary(&rest),
        _ => {
            eprintln!("usage: digit-cnn <train|predict|summary> [options]");
            Ok(())
        }
    }
}

/// Pulls the value following `flag` out of `args`.
fn take_value(args: &mut Vec<String>, flag: &str) -> Result<Option<String>> {
    match args.iter().position(|a| a == flag) {
        Some(i) if i + 1 < args.len() => {
            let value = args.remove(i + 1);
            args.remove(i);
            Ok(Some(value))
        }
        Some(_) => bail!("{} needs a value", flag),
        None => Ok(None),
    }
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    match args.iter().position(|a| a == flag) {
        Some(i) => {
            args.remove(i);
            true
        }
        None => false,
    }
}

fn take_parsed<T: std::str::FromStr>(args: &mut Vec<String>, flag: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    take_value(args, flag)?
        .map(|v| v.parse::<T>().map_err(|e| anyhow!("{} {}: {}", flag, v, e)))
        .transpose()
}

fn parse_variant(name: &str) -> Result<Variant> {
    match name {
        "basic" => Ok(Variant::Basic),
        "regularized" => Ok(Variant::Regularized),
        other => bail!("unknown variant '{}' (expected basic or regularized)", other),
    }
}

fn train(args: &[String]) -> Result<()> {
    let mut args = args.to_vec();
    let mut config = match take_value(&mut args, "--config")? {
        Some(path) => TrainingConfig::load_json(&path)
            .with_context(|| format!("loading training config {}", path))?,
        None => TrainingConfig::default(),
    };
    if let Some(v) = take_value(&mut args, "--variant")? {
        // The schedule follows the variant unless overridden below.
        let variant = parse_variant(&v)?;
        config = TrainingConfig {
            data_dir: config.data_dir,
            model_path: config.model_path,
            seed: config.seed,
            ..TrainingConfig::for_variant(variant)
        };
    }
    if let Some(n) = take_parsed(&mut args, "--epochs")? {
        config.epochs = n;
    }
    if let Some(n) = take_parsed(&mut args, "--batch-size")? {
        config.batch_size = n;
    }
    if let Some(n) = take_parsed(&mut args, "--seed")? {
        config.seed = n;
    }
    if let Some(dir) = take_value(&mut args, "--data")? {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(out) = take_value(&mut args, "--out")? {
        config.model_path = PathBuf::from(out);
    }
    config.train_limit = take_parsed(&mut args, "--train-limit")?.or(config.train_limit);
    config.test_limit = take_parsed(&mut args, "--test-limit")?.or(config.test_limit);
    if let Some(extra) = args.first() {
        bail!("unexpected argument '{}'", extra);
    }
    config.validate()?;

    let mut session = Session::new().with_limits(config.train_limit, config.test_limit);
    session
        .load_data(&config.data_dir)
        .with_context(|| format!("loading MNIST from {}", config.data_dir.display()))?;
    session.build_model(config.variant, config.seed)?;
    let report = session.train(&config.fit_config())?;

    println!("Test accuracy: {:.1}%", report.test.accuracy * 100.0);
    println!("Test loss:     {:.4}", report.test.loss);
    println!();
    println!("{:<8}{:>10}", "Digit", "Accuracy");
    for (digit, acc) in report.per_class_accuracy.iter().enumerate() {
        match acc {
            Some(a) => println!("{:<8}{:>9.1}%", CLASS_NAMES[digit], a * 100.0),
            None => println!("{:<8}{:>10}", CLASS_NAMES[digit], "-"),
        }
    }
    println!();
    println!("Confusion matrix (rows = true digit, columns = predicted):");
    for row in &report.confusion {
        println!("{}", row.iter().map(|c| format!("{:>6}", c)).collect::<String>());
    }

    session
        .save_model(&config.model_path)
        .with_context(|| format!("saving model to {}", config.model_path.display()))?;
    info!("done");
    Ok(())
}

fn predict(args: &[String]) -> Result<()> {
    let mut args = args.to_vec();
    let model_path = take_value(&mut args, "--model")?.ok_or_else(|| anyhow!("--model is required"))?;
    let grayscale = if take_flag(&mut args, "--luminance") {
        Grayscale::Luminance
    } else {
        Grayscale::FirstChannel
    };
    if args.is_empty() {
        bail!("no images given");
    }

    let classifier = Classifier::load(&model_path)
        .with_context(|| format!("loading model {}", model_path))?
        .with_grayscale(grayscale);

    for path in &args {
        let rgba = image::open(path).with_context(|| format!("decoding {}", path))?.to_rgba8();
        let (w, h) = rgba.dimensions();
        let raw = RawImage::from_rgba(w as usize, h as usize, rgba.into_raw())?;
        let p = classifier.classify(&raw)?;
        let top3: Vec<String> = p
            .ranking
            .iter()
            .take(3)
            .map(|(d, prob)| format!("{} {:.1}%", d, prob * 100.0))
            .collect();
        println!("{}: {} ({})", path, p.class_name, top3.join(", "));
    }
    Ok(())
}

fn summary(args: &[String]) -> Result<()> {
    let mut args = args.to_vec();
    let variant = match take_value(&mut args, "--variant")? {
        Some(v) => parse_variant(&v)?,
        None => Variant::Regularized,
    };
    let model = Model::compile(ModelSpec::digit_classifier(variant), CompileConfig::default(), 0)?;
    print!("{}", model.summary());
    Ok(())
}
