//! Model loading with a reference-architecture fallback.
//!
//! Direct load builds exactly what the file declares. If that fails (old or
//! foreign topology, version mismatch, missing tensors), the reference CNN is
//! rebuilt and weights are bound by layer name and shape.

use ndarray::ArrayD;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::onnx::{is_onnx_path, OnnxModel};
use super::sequential::{Binding, SequentialModel};
use super::spec::reference_architecture;
use super::weights::TensorStore;
use super::{EmotionModel, FormatError, InferenceError, InputShape, LoadError};

/// Which route produced the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadPath {
    Direct,
    Fallback {
        /// Tensors bound to the reference layers
        loaded: usize,
        /// Tensors in the file that were not used
        skipped: usize,
        /// Reference layers left with zero weights
        zeroed: Vec<String>,
    },
}

/// A ready-to-use model and where it came from
pub struct LoadedModel {
    model: Box<dyn EmotionModel>,
    load_path: LoadPath,
    source: PathBuf,
}

impl LoadedModel {
    pub fn new(model: Box<dyn EmotionModel>, load_path: LoadPath, source: PathBuf) -> Self {
        Self {
            model,
            load_path,
            source,
        }
    }

    pub fn load_path(&self) -> &LoadPath {
        &self.load_path
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.load_path, LoadPath::Fallback { .. })
    }
}

impl EmotionModel for LoadedModel {
    fn input_shape(&self) -> &InputShape {
        self.model.input_shape()
    }

    fn output_width(&self) -> usize {
        self.model.output_width()
    }

    fn predict(&self, input: &ArrayD<f32>) -> Result<Vec<Vec<f32>>, InferenceError> {
        self.model.predict(input)
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("source", &self.source)
            .field("load_path", &self.load_path)
            .field("input_shape", self.model.input_shape())
            .field("output_width", &self.model.output_width())
            .finish()
    }
}

/// Load a model file, falling back to the reference architecture
pub fn load_model(path: &Path) -> Result<LoadedModel, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    let direct = match load_direct(path) {
        Ok(model) => {
            info!(
                "Model loaded directly from {:?}: input {}, {} outputs",
                path,
                model.input_shape(),
                model.output_width()
            );
            return Ok(LoadedModel::new(model, LoadPath::Direct, path.to_path_buf()));
        }
        Err(e) => e,
    };

    warn!(
        "Direct load of {:?} failed ({}), rebuilding reference architecture",
        path, direct
    );

    match load_fallback(path) {
        Ok((model, load_path)) => Ok(LoadedModel::new(
            Box::new(model),
            load_path,
            path.to_path_buf(),
        )),
        Err(fallback) => Err(LoadError::Failed {
            path: path.to_path_buf(),
            direct,
            fallback,
        }),
    }
}

fn load_direct(path: &Path) -> Result<Box<dyn EmotionModel>, FormatError> {
    if is_onnx_path(path) {
        return OnnxModel::load(path).map(|m| Box::new(m) as Box<dyn EmotionModel>);
    }

    let mut store = TensorStore::read(path)?;
    let spec = store.model_spec()?;
    let (model, _) = SequentialModel::build(&spec, &mut store, Binding::Strict)?;
    Ok(Box::new(model))
}

fn load_fallback(path: &Path) -> Result<(SequentialModel, LoadPath), FormatError> {
    let mut store = TensorStore::read(path)?;
    let (model, report) =
        SequentialModel::build(&reference_architecture(), &mut store, Binding::ByName)?;

    if report.loaded.is_empty() {
        return Err(FormatError::NoMatchingTensors);
    }

    info!(
        "Fallback model '{}' built: {} tensors loaded, {} skipped",
        model.name(),
        report.loaded.len(),
        report.skipped.len()
    );
    if !report.zeroed.is_empty() {
        warn!(
            "Layers without stored weights were zero-initialised: {}",
            report.zeroed.join(", ")
        );
    }

    Ok((
        model,
        LoadPath::Fallback {
            loaded: report.loaded.len(),
            skipped: report.skipped.len(),
            zeroed: report.zeroed,
        },
    ))
}
