//! Serialized model topology.
//!
//! The layout mirrors a Keras `Sequential` config: each layer is an object with
//! `class_name` and `config`, and the input shape uses `null` for the batch
//! dimension.

use serde::{Deserialize, Serialize};

use crate::emotion::Emotion;
use crate::features::N_MFCC;

/// Current model file format version
pub const FORMAT_VERSION: u32 = 1;

/// Name given to the built-in reference topology
pub const REFERENCE_MODEL_NAME: &str = "ser_cnn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Softmax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    #[default]
    Valid,
    Same,
}

/// One layer of a sequential model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_name", content = "config")]
pub enum LayerSpec {
    Conv1D {
        name: String,
        filters: usize,
        kernel_size: usize,
        #[serde(default)]
        padding: Padding,
        #[serde(default)]
        activation: Activation,
    },
    Activation {
        name: String,
        activation: Activation,
    },
    Dropout {
        name: String,
        rate: f32,
    },
    MaxPooling1D {
        name: String,
        pool_size: usize,
    },
    Flatten {
        name: String,
    },
    Dense {
        name: String,
        units: usize,
        #[serde(default)]
        activation: Activation,
    },
}

impl LayerSpec {
    pub fn name(&self) -> &str {
        match self {
            LayerSpec::Conv1D { name, .. }
            | LayerSpec::Activation { name, .. }
            | LayerSpec::Dropout { name, .. }
            | LayerSpec::MaxPooling1D { name, .. }
            | LayerSpec::Flatten { name }
            | LayerSpec::Dense { name, .. } => name,
        }
    }
}

/// Sequential model topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    /// Declared input shape, `None` marks an unknown dimension (batch)
    pub input_shape: Vec<Option<usize>>,
    pub layers: Vec<LayerSpec>,
}

impl ModelSpec {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// The 1-D CNN the emotion model was trained with.
///
/// Layer names and sizes must stay exactly as they are: the fallback loader
/// binds stored weights to this topology by name and shape.
pub fn reference_architecture() -> ModelSpec {
    let conv = |idx: usize, filters: usize| LayerSpec::Conv1D {
        name: format!("conv1d_{}", idx),
        filters,
        kernel_size: 5,
        padding: Padding::Same,
        activation: Activation::Linear,
    };
    let relu = |idx: usize| LayerSpec::Activation {
        name: format!("activation_{}", idx),
        activation: Activation::Relu,
    };
    let dropout = |idx: usize| LayerSpec::Dropout {
        name: format!("dropout_{}", idx),
        rate: 0.1,
    };
    let pool = |idx: usize| LayerSpec::MaxPooling1D {
        name: format!("max_pooling1d_{}", idx),
        pool_size: 4,
    };

    ModelSpec {
        name: REFERENCE_MODEL_NAME.to_string(),
        input_shape: vec![None, Some(N_MFCC), Some(1)],
        layers: vec![
            conv(1, 64),
            relu(1),
            dropout(1),
            pool(1),
            conv(2, 128),
            relu(2),
            dropout(2),
            pool(2),
            conv(3, 256),
            relu(3),
            dropout(3),
            LayerSpec::Flatten {
                name: "flatten_1".to_string(),
            },
            LayerSpec::Dense {
                name: "dense_1".to_string(),
                units: Emotion::ALL.len(),
                activation: Activation::Linear,
            },
            LayerSpec::Activation {
                name: "activation_4".to_string(),
                activation: Activation::Softmax,
            },
        ],
    }
}
