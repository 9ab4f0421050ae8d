//! Model artifact: a topology JSON plus a raw weights file next to it.
//!
//! `<stem>.json` carries the model spec, compile configuration, metadata and a
//! manifest listing every persisted tensor in order; `<stem>.weights.bin`
//! holds the tensor values back to back as little-endian `f64`.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::network::metadata::ModelMetadata;
use crate::network::model::Model;
use crate::network::spec::{element_count, CompileConfig, ModelSpec};

const FORMAT: &str = "digit-cnn/1";
const DTYPE: &str = "float64";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub layer: usize,
    pub name: String,
    pub shape: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format: String,
    pub spec: ModelSpec,
    pub compile: CompileConfig,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
    /// File name of the weights file, relative to the JSON file.
    pub weights_path: String,
    pub dtype: String,
    pub weights_manifest: Vec<WeightEntry>,
}

/// `dir/name.json` → `dir/name.weights.bin`
pub fn weights_path_for(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("model");
    path.with_file_name(format!("{}.weights.bin", stem))
}

impl Model {
    fn manifest(&self) -> Vec<WeightEntry> {
        self.layers.iter().enumerate()
            .flat_map(|(i, layer)| {
                layer.weights().into_iter().map(move |(name, t)| WeightEntry {
                    layer: i,
                    name: name.to_owned(),
                    shape: t.shape.clone(),
                })
            })
            .collect()
    }

    /// Writes the topology JSON to `path` and the weights next to it.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let weights_path = weights_path_for(path);

        let mut bytes = Vec::with_capacity(self.param_count() * 8);
        for layer in &self.layers {
            for (_, tensor) in layer.weights() {
                for v in &tensor.data {
                    bytes.extend_from_slice(&v.to_le_bytes());
                }
            }
        }

        let artifact = ModelArtifact {
            format: FORMAT.to_owned(),
            spec: self.spec.clone(),
            compile: self.compile.clone(),
            metadata: self.metadata.clone(),
            weights_path: weights_path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_owned(),
            dtype: DTYPE.to_owned(),
            weights_manifest: self.manifest(),
        };

        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &artifact)?;
        fs::write(&weights_path, bytes)?;
        info!(
            "saved model '{}' to {} (+ {})",
            self.spec.name,
            path.display(),
            weights_path.display()
        );
        Ok(())
    }

    /// Reads a model written by `save`. Missing files, unknown formats and
    /// manifest/weight mismatches fail with `Error::Load`.
    pub fn load(path: impl AsRef<Path>) -> Result<Model> {
        let path = path.as_ref();
        let json = fs::read(path)
            .map_err(|e| Error::load(format!("cannot read '{}': {}", path.display(), e)))?;
        let artifact: ModelArtifact = serde_json::from_slice(&json)
            .map_err(|e| Error::load(format!("'{}' is not a model artifact: {}", path.display(), e)))?;
        if artifact.format != FORMAT || artifact.dtype != DTYPE {
            return Err(Error::load(format!(
                "unsupported artifact format '{}' ({})",
                artifact.format, artifact.dtype
            )));
        }

        let weights_path = path.with_file_name(&artifact.weights_path);
        let bytes = fs::read(&weights_path)
            .map_err(|e| Error::load(format!("cannot read '{}': {}", weights_path.display(), e)))?;

        // Size the topology before allocating anything for it.
        let params = artifact
            .spec
            .param_count()
            .map_err(|e| Error::load(format!("'{}' has an unusable topology: {}", path.display(), e)))?;
        let listed = artifact
            .weights_manifest
            .iter()
            .try_fold(0usize, |total, entry| total.checked_add(element_count(&entry.shape).ok()?));
        if listed != Some(params) {
            return Err(Error::load(format!(
                "weights manifest in '{}' does not match its topology",
                path.display()
            )));
        }
        if bytes.len() % 8 != 0 || bytes.len() / 8 != params {
            return Err(Error::load(format!(
                "'{}' holds {} bytes, topology needs {} values",
                weights_path.display(), bytes.len(), params
            )));
        }

        let mut model = Model::compile(artifact.spec, artifact.compile, 0)
            .map_err(|e| Error::load(format!("cannot rebuild '{}': {}", path.display(), e)))?;
        model.metadata = artifact.metadata;
        if model.manifest() != artifact.weights_manifest {
            return Err(Error::load(format!(
                "weights manifest in '{}' does not match its topology",
                path.display()
            )));
        }

        let mut values = bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]));
        for layer in &mut model.layers {
            for (_, tensor) in layer.weights_mut() {
                for v in tensor.data.iter_mut() {
                    // Length was checked above.
                    *v = values.next().unwrap_or_default();
                }
            }
        }

        info!("loaded model '{}' from {}", model.spec.name, path.display());
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::Tensor;
    use crate::network::spec::Variant;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("digit-cnn-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn save_then_load_predicts_identically() {
        let dir = temp_dir("persist");
        let path = dir.join("model.json");
        let model = Model::compile(
            ModelSpec::digit_classifier(Variant::Regularized), CompileConfig::default(), 9,
        ).unwrap();
        model.save(&path).unwrap();
        assert!(dir.join("model.weights.bin").exists());

        let loaded = Model::load(&path).unwrap();
        let x = Tensor::filled(&[2, 28, 28, 1], 0.3);
        assert_eq!(model.predict(&x).unwrap(), loaded.predict(&x).unwrap());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn truncated_weights_are_a_load_error() {
        let dir = temp_dir("truncated");
        let path = dir.join("m.json");
        let model = Model::compile(
            ModelSpec::digit_classifier(Variant::Basic), CompileConfig::default(), 1,
        ).unwrap();
        model.save(&path).unwrap();
        let bin = dir.join("m.weights.bin");
        let bytes = fs::read(&bin).unwrap();
        fs::write(&bin, &bytes[..bytes.len() - 8]).unwrap();
        assert!(matches!(Model::load(&path), Err(Error::Load(_))));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_a_load_error() {
        assert!(matches!(Model::load("/nonexistent/model.json"), Err(Error::Load(_))));
    }

    #[test]
    fn absurd_filter_count_is_a_load_error() {
        let dir = temp_dir("absurd");
        let path = dir.join("m.json");
        let model = Model::compile(
            ModelSpec::digit_classifier(Variant::Basic), CompileConfig::default(), 2,
        ).unwrap();
        model.save(&path).unwrap();
        let json = fs::read_to_string(&path).unwrap();
        let patched = json.replacen("\"filters\": 16", &format!("\"filters\": {}", 1u64 << 62), 1);
        assert_ne!(json, patched);
        fs::write(&path, patched).unwrap();
        assert!(matches!(Model::load(&path), Err(Error::Load(_))));

        // Large but non-overflowing counts are refused by the size check.
        let json = fs::read_to_string(&path).unwrap();
        fs::write(&path, json.replacen(&format!("{}", 1u64 << 62), "100000000", 1)).unwrap();
        assert!(matches!(Model::load(&path), Err(Error::Load(_))));
        let _ = fs::remove_dir_all(&dir);
    }
}
