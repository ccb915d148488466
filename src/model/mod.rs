//! Emotion classifier models.
//!
//! A model maps a batch of MFCC vectors to one probability distribution over
//! the emotion labels per row. Models come from a safetensors file (topology in
//! the header, weights by layer name) or, with the `onnx` feature, from an ONNX
//! graph. When a file cannot be loaded as declared, the loader rebuilds the
//! reference CNN and binds whatever weights match by name.

pub mod adapter;
pub mod cache;
pub mod layers;
pub mod loader;
pub mod onnx;
pub mod sequential;
pub mod spec;
pub mod weights;

pub use adapter::adapt_input;
pub use cache::ModelCache;
pub use loader::{load_model, LoadPath, LoadedModel};
pub use sequential::{BindReport, Binding, SequentialModel};
pub use spec::{reference_architecture, LayerSpec, ModelSpec};
pub use weights::{save_model, TensorStore};

use ndarray::ArrayD;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Declared input shape, `None` for dimensions left open (the batch axis)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputShape(Vec<Option<usize>>);

impl InputShape {
    pub fn new(dims: Vec<Option<usize>>) -> Self {
        Self(dims)
    }

    pub fn dims(&self) -> &[Option<usize>] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self
            .0
            .iter()
            .map(|d| d.map_or_else(|| "None".to_string(), |n| n.to_string()))
            .collect();
        write!(f, "({})", dims.join(", "))
    }
}

impl serde::Serialize for InputShape {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&self.0, serializer)
    }
}

/// A classifier producing a probability distribution per input row
pub trait EmotionModel: Send + Sync {
    fn input_shape(&self) -> &InputShape;

    fn output_width(&self) -> usize;

    /// One output vector per batch row
    fn predict(&self, input: &ArrayD<f32>) -> Result<Vec<Vec<f32>>, InferenceError>;
}

/// Problems with a model file's contents
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Not a readable tensor container: {0}")]
    Container(String),

    #[error("Missing header metadata '{0}'")]
    MissingMetadata(&'static str),

    #[error("Unsupported model format version {0}")]
    UnsupportedVersion(String),

    #[error("Invalid model topology: {0}")]
    Topology(String),

    #[error("Tensor '{tensor}' has unsupported dtype {dtype}")]
    UnsupportedDtype { tensor: String, dtype: String },

    #[error("Missing weight tensor '{0}'")]
    MissingTensor(String),

    #[error("Tensor '{tensor}' has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        tensor: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Tensors not used by any layer: {0}")]
    UnexpectedTensors(String),

    #[error("No stored tensor matches the reference architecture")]
    NoMatchingTensors,

    #[error("ONNX runtime error: {0}")]
    Onnx(String),

    #[error("ONNX support not enabled (rebuild with --features onnx)")]
    OnnxNotEnabled,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Model file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to load model {path:?}: direct load: {direct}; fallback: {fallback}")]
    Failed {
        path: PathBuf,
        direct: FormatError,
        fallback: FormatError,
    },
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Input shape error: {0}")]
    Shape(String),

    #[error("Inference failed: {0}")]
    Runtime(String),
}

/// Feature vector cannot be fitted to the model's declared input
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Unsupported model input shape {0}: expected (None, n) or (None, n, 1)")]
    Unsupported(InputShape),

    #[error("Model expects {expected} features, got {actual}")]
    FeatureLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_shape_display() {
        let shape = InputShape::new(vec![None, Some(40), Some(1)]);
        assert_eq!(shape.to_string(), "(None, 40, 1)");
        assert_eq!(shape.rank(), 3);
        assert_eq!(serde_json::to_string(&shape).unwrap(), "[null,40,1]");
    }

    #[test]
    fn test_load_error_carries_both_causes() {
        let err = LoadError::Failed {
            path: PathBuf::from("m.safetensors"),
            direct: FormatError::MissingMetadata("model_config"),
            fallback: FormatError::NoMatchingTensors,
        };
        let msg = err.to_string();
        assert!(msg.contains("model_config"));
        assert!(msg.contains("No stored tensor"));
    }
}
