//! ONNX Runtime backend for `.onnx` model files.

#[cfg(feature = "onnx")]
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::{Value, ValueType},
};
#[cfg(feature = "onnx")]
use std::sync::Mutex;

use ndarray::ArrayD;
use std::path::Path;

use super::{EmotionModel, FormatError, InferenceError, InputShape};

/// File extension routed to this backend
pub const ONNX_EXTENSION: &str = "onnx";

pub fn is_onnx_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ONNX_EXTENSION))
}

#[cfg(feature = "onnx")]
pub struct OnnxModel {
    session: Mutex<Session>,
    input_shape: InputShape,
    output_width: usize,
}

#[cfg(feature = "onnx")]
impl OnnxModel {
    pub fn load(path: &Path) -> Result<Self, FormatError> {
        let session = Session::builder()
            .map_err(|e: ort::Error| FormatError::Onnx(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| FormatError::Onnx(e.to_string()))?
            .with_intra_threads(1)
            .map_err(|e: ort::Error| FormatError::Onnx(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e: ort::Error| FormatError::Onnx(e.to_string()))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| FormatError::Onnx("graph has no inputs".to_string()))?;
        let input_shape = match &input.input_type {
            ValueType::Tensor { shape, .. } => InputShape::new(
                shape
                    .iter()
                    .map(|&d| usize::try_from(d).ok().filter(|&n| n > 0))
                    .collect(),
            ),
            other => {
                return Err(FormatError::Onnx(format!(
                    "input '{}' is not a tensor: {:?}",
                    input.name, other
                )))
            }
        };

        let output = session
            .outputs
            .first()
            .ok_or_else(|| FormatError::Onnx("graph has no outputs".to_string()))?;
        let output_width = match &output.output_type {
            ValueType::Tensor { shape, .. } => shape
                .last()
                .and_then(|&d| usize::try_from(d).ok())
                .filter(|&n| n > 0)
                .ok_or_else(|| {
                    FormatError::Onnx(format!("output '{}' has no fixed width", output.name))
                })?,
            other => {
                return Err(FormatError::Onnx(format!(
                    "output '{}' is not a tensor: {:?}",
                    output.name, other
                )))
            }
        };

        tracing::info!(
            "ONNX model loaded from {:?}: input {}, {} outputs",
            path,
            input_shape,
            output_width
        );

        Ok(Self {
            session: Mutex::new(session),
            input_shape,
            output_width,
        })
    }
}

#[cfg(feature = "onnx")]
impl EmotionModel for OnnxModel {
    fn input_shape(&self) -> &InputShape {
        &self.input_shape
    }

    fn output_width(&self) -> usize {
        self.output_width
    }

    fn predict(&self, input: &ArrayD<f32>) -> Result<Vec<Vec<f32>>, InferenceError> {
        let shape = input.shape().to_vec();
        let batch = shape.first().copied().unwrap_or(1).max(1);
        let values: Vec<f32> = input.iter().copied().collect();

        let tensor = Value::from_array((shape, values))
            .map_err(|e: ort::Error| InferenceError::Runtime(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e: ort::Error| InferenceError::Runtime(e.to_string()))?;

        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| InferenceError::Runtime("No output from model".to_string()))?;
        let extracted = output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e: ort::Error| InferenceError::Runtime(e.to_string()))?;
        let flat: Vec<f32> = extracted.1.iter().copied().collect();

        if flat.len() != batch * self.output_width {
            return Err(InferenceError::Runtime(format!(
                "expected {} outputs, got {}",
                batch * self.output_width,
                flat.len()
            )));
        }
        Ok(flat
            .chunks(self.output_width)
            .map(<[f32]>::to_vec)
            .collect())
    }
}

// Stub implementation when feature is not enabled
#[cfg(not(feature = "onnx"))]
pub struct OnnxModel {
    input_shape: InputShape,
}

#[cfg(not(feature = "onnx"))]
impl OnnxModel {
    pub fn load(_path: &Path) -> Result<Self, FormatError> {
        Err(FormatError::OnnxNotEnabled)
    }
}

#[cfg(not(feature = "onnx"))]
impl EmotionModel for OnnxModel {
    fn input_shape(&self) -> &InputShape {
        &self.input_shape
    }

    fn output_width(&self) -> usize {
        0
    }

    fn predict(&self, _input: &ArrayD<f32>) -> Result<Vec<Vec<f32>>, InferenceError> {
        Err(InferenceError::Runtime(FormatError::OnnxNotEnabled.to_string()))
    }
}
