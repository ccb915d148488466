//! Request/response types for the HTTP interface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::emotion::{PredictError, PredictionResult};
use crate::features::{AudioOverview, FeatureError};
use crate::model::{InputShape, LoadPath};

/// JSON error with an HTTP status
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("API error: {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<FeatureError> for ApiError {
    fn from(e: FeatureError) -> Self {
        let status = match e {
            FeatureError::NotFound(_) => StatusCode::NOT_FOUND,
            FeatureError::Decode { .. } | FeatureError::EmptyAudio(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            FeatureError::Resample(_) | FeatureError::Fft(_) | FeatureError::InvalidConfig(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<PredictError> for ApiError {
    fn from(e: PredictError) -> Self {
        match e {
            PredictError::Feature(inner) => inner.into(),
            other => Self::internal(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub path: String,
    pub input_shape: InputShape,
    pub output_width: usize,
    pub load_path: LoadPath,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ExampleEntry {
    pub name: String,
    pub size_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct ExamplesResponse {
    pub examples: Vec<ExampleEntry>,
}

/// Analysis plus prediction for one clip
#[derive(Debug, Serialize)]
pub struct ClipReport {
    pub name: String,
    pub analysis: AudioOverview,
    pub prediction: PredictionResult,
}
