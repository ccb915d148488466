//! Emotion labels and prediction results.

pub mod predictor;

pub use predictor::{predict_path, PredictError, Predictor};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// The eight emotion classes, in model output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Calm,
    Happy,
    Sad,
    Angry,
    Fear,
    Disgust,
    Surprised,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Neutral,
        Emotion::Calm,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Fear,
        Emotion::Disgust,
        Emotion::Surprised,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Calm => "calm",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Fear => "fear",
            Emotion::Disgust => "disgust",
            Emotion::Surprised => "surprised",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Emotion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.label().eq_ignore_ascii_case(needle))
            .ok_or_else(|| format!("Unknown emotion: {}", s))
    }
}

/// Label for a model output index; indices past the label set become the number itself
pub fn label_for_index(index: usize) -> String {
    Emotion::from_index(index)
        .map(|e| e.label().to_string())
        .unwrap_or_else(|| index.to_string())
}

/// One file's prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub file: PathBuf,
    pub pred_label: String,
    pub pred_index: usize,
    /// Probability of the predicted class
    pub confidence: f32,
    /// Full distribution in label order
    pub probs: Vec<f32>,
}

impl PredictionResult {
    /// Build a result from a probability vector, picking the arg-max
    pub fn from_probs(file: PathBuf, probs: Vec<f32>) -> Option<Self> {
        let (pred_index, confidence) = argmax(&probs)?;
        Some(Self {
            file,
            pred_label: label_for_index(pred_index),
            pred_index,
            confidence,
            probs,
        })
    }

    pub fn emotion(&self) -> Option<Emotion> {
        Emotion::from_index(self.pred_index)
    }

    /// `(label, probability)` pairs sorted by probability, highest first
    pub fn ranked(&self) -> Vec<(String, f32)> {
        let mut ranked: Vec<(String, f32)> = self
            .probs
            .iter()
            .enumerate()
            .map(|(i, &p)| (label_for_index(i), p))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

/// Index and value of the largest element, first one on ties. NaN never wins.
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best, (i, v)| match best {
            Some((_, best_v)) if best_v >= v => best,
            _ => Some((i, v)),
        })
}
