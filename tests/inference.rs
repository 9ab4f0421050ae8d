use std::path::PathBuf;

use digit_cnn::{
    ActivationFunction, Classifier, CompileConfig, Error, Model, ModelMetadata, ModelSpec,
    RawImage, Session, Variant, CLASS_NAMES,
};

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("digit-cnn-it-{}", std::process::id()))
        .join(name)
}

fn black_canvas(size: usize) -> RawImage {
    let pixels = [0, 0, 0, 255].repeat(size * size);
    RawImage::from_rgba(size, size, pixels).unwrap()
}

/// A white vertical stroke on a black canvas, roughly a "1".
fn stroke_canvas(size: usize) -> RawImage {
    let mut pixels = Vec::with_capacity(size * size * 4);
    for _y in 0..size {
        for x in 0..size {
            let v = if x.abs_diff(size / 2) < size / 14 { 255 } else { 0 };
            pixels.extend_from_slice(&[v, v, v, 255]);
        }
    }
    RawImage::from_rgba(size, size, pixels).unwrap()
}

#[test_log::test]
fn black_canvas_yields_a_distribution() {
    let mut session = Session::new();
    session.build_model(Variant::Regularized, 11).unwrap();
    let prediction = session.predict(&black_canvas(280)).unwrap();

    let total: f64 = prediction.probabilities.iter().sum();
    assert!((total - 1.0).abs() < 1e-6);
    assert!(prediction.probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
    assert_eq!(prediction.class_name, CLASS_NAMES[prediction.label]);
}

#[test_log::test]
fn saved_model_classifies_identically() {
    let path = scratch_path("roundtrip.json");
    let mut session = Session::new();
    session.build_model(Variant::Basic, 12).unwrap();
    session.save_model(&path).unwrap();

    let image = stroke_canvas(140);
    let before = session.predict(&image).unwrap();
    let classifier = Classifier::load(&path).unwrap();
    let after = classifier.classify(&image).unwrap();
    assert_eq!(before, after);

    // Same image, same model: same answer every time.
    assert_eq!(classifier.classify(&image).unwrap(), after);
}

#[test_log::test]
fn non_digit_input_shape_is_rejected_on_load() {
    let spec = ModelSpec::builder("wide")
        .input_shape(&[32, 32, 1])
        .conv2d(4, 3, ActivationFunction::ReLU)
        .flatten()
        .dense(10, ActivationFunction::Softmax)
        .build()
        .unwrap();
    let mut model = Model::compile(spec, CompileConfig::default(), 1).unwrap();
    model.metadata = Some(ModelMetadata::digits());

    let path = scratch_path("wide.json");
    model.save(&path).unwrap();
    assert!(Model::load(&path).is_ok());
    assert!(matches!(Classifier::load(&path), Err(Error::Configuration(_))));
}

#[test_log::test]
fn missing_artifact_is_a_load_error() {
    let mut session = Session::new();
    let err = session.load_model(scratch_path("absent.json")).unwrap_err();
    assert!(matches!(err, Error::Load(_)));
    assert!(session.model().is_none());
}
