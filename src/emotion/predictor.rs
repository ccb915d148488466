//! Audio file to emotion: extract, adapt, infer, arg-max.

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::PredictionResult;
use crate::features::{extract_with, FeatureError, FeatureVector, MfccConfig, MfccExtractor};
use crate::model::{adapt_input, EmotionModel, InferenceError, LoadError, LoadedModel, ModelCache, ShapeError};

#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("Model returned no usable output")]
    EmptyOutput,
}

/// Classifier bound to one loaded model
pub struct Predictor {
    model: Arc<LoadedModel>,
    extractor: MfccExtractor,
}

impl Predictor {
    pub fn new(model: Arc<LoadedModel>) -> Result<Self, PredictError> {
        let extractor = MfccExtractor::new(MfccConfig::default())?;
        Ok(Self { model, extractor })
    }

    /// Predictor over the cached model for `model_path`
    pub fn from_cache(model_path: &Path) -> Result<Self, PredictError> {
        let model = ModelCache::global().get_or_load(model_path)?;
        Self::new(model)
    }

    pub fn model(&self) -> &Arc<LoadedModel> {
        &self.model
    }

    pub fn extract(&self, audio_path: &Path) -> Result<FeatureVector, PredictError> {
        Ok(extract_with(&self.extractor, audio_path)?)
    }

    /// Probability distribution for one feature vector
    pub fn probabilities(&self, features: &FeatureVector) -> Result<Vec<f32>, PredictError> {
        let input = adapt_input(self.model.input_shape(), features.as_slice())?;
        self.model
            .predict(&input)?
            .into_iter()
            .next()
            .filter(|probs| !probs.is_empty())
            .ok_or(PredictError::EmptyOutput)
    }

    pub fn predict(&self, audio_path: &Path) -> Result<PredictionResult, PredictError> {
        let features = self.extract(audio_path)?;
        let probs = self.probabilities(&features)?;
        let result = PredictionResult::from_probs(audio_path.to_path_buf(), probs)
            .ok_or(PredictError::EmptyOutput)?;

        debug!(
            "{:?} -> {} ({:.1}%)",
            audio_path,
            result.pred_label,
            result.confidence * 100.0
        );
        Ok(result)
    }
}

/// Predict one file with the process-wide cached model
pub fn predict_path(audio_path: &Path, model_path: &Path) -> Result<PredictionResult, PredictError> {
    Predictor::from_cache(model_path)?.predict(audio_path)
}
