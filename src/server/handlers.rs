//! Route handlers.
//!
//! Feature extraction and inference are CPU-bound, so every handler that
//! touches audio runs its work on the blocking pool.

use axum::{
    body::Bytes,
    extract::{Path as UrlPath, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::types::{ApiError, ClipReport, ExampleEntry, ExamplesResponse, HealthResponse, ModelInfo};
use super::AppState;
use crate::batch::collect_wav_files;
use crate::emotion::{Emotion, PredictionResult, Predictor};
use crate::features::{AudioOverview, OverviewConfig};
use crate::model::EmotionModel;

/// Single-page client for the API below
pub async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    let model = state.predictor.model();
    Json(ModelInfo {
        path: model.source().display().to_string(),
        input_shape: model.input_shape().clone(),
        output_width: model.output_width(),
        load_path: model.load_path().clone(),
        labels: Emotion::ALL.iter().map(|e| e.label()).collect(),
    })
}

pub async fn emotions() -> Json<Vec<&'static str>> {
    Json(Emotion::ALL.iter().map(|e| e.label()).collect())
}

pub async fn list_examples(State(state): State<AppState>) -> Result<Json<ExamplesResponse>, ApiError> {
    let files = example_files(&state.examples_dir)?;
    let examples = files
        .iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            Some(ExampleEntry { name, size_bytes })
        })
        .collect();
    Ok(Json(ExamplesResponse { examples }))
}

pub async fn example_analysis(
    State(state): State<AppState>,
    UrlPath(name): UrlPath<String>,
) -> Result<Json<AudioOverview>, ApiError> {
    let path = resolve_example(&state.examples_dir, &name)?;
    let overview = run_blocking(move || {
        AudioOverview::from_file(&path, &OverviewConfig::default()).map_err(ApiError::from)
    })
    .await?;
    Ok(Json(overview))
}

/// Raw bytes of an example clip, for playback
pub async fn example_audio(
    State(state): State<AppState>,
    UrlPath(name): UrlPath<String>,
) -> Result<Response, ApiError> {
    let path = resolve_example(&state.examples_dir, &name)?;
    let bytes = run_blocking(move || {
        std::fs::read(&path)
            .map_err(|e| ApiError::internal(format!("Failed to read {:?}: {}", path, e)))
    })
    .await?;
    Ok(([(header::CONTENT_TYPE, "audio/wav")], bytes).into_response())
}

pub async fn example_predict(
    State(state): State<AppState>,
    UrlPath(name): UrlPath<String>,
) -> Result<Json<PredictionResult>, ApiError> {
    let path = resolve_example(&state.examples_dir, &name)?;
    let predictor = Arc::clone(&state.predictor);
    let result = run_blocking(move || predictor.predict(&path).map_err(ApiError::from)).await?;
    info!("Example '{}' -> {}", name, result.pred_label);
    Ok(Json(result))
}

/// Raw WAV bytes in, waveform and mel spectrogram out
pub async fn upload_analysis(body: Bytes) -> Result<Json<AudioOverview>, ApiError> {
    require_body(&body)?;
    let overview = run_blocking(move || {
        with_upload_file(&body, |path| {
            Ok(AudioOverview::from_file(path, &OverviewConfig::default())?)
        })
    })
    .await?;
    Ok(Json(overview))
}

/// Raw WAV bytes in, analysis and prediction out
pub async fn upload(State(state): State<AppState>, body: Bytes) -> Result<Json<ClipReport>, ApiError> {
    require_body(&body)?;
    let predictor = Arc::clone(&state.predictor);
    let report = run_blocking(move || {
        with_upload_file(&body, |path| analyse_upload(&predictor, path))
    })
    .await?;
    info!(
        "Upload -> {} ({:.1}%)",
        report.prediction.pred_label,
        report.prediction.confidence * 100.0
    );
    Ok(Json(report))
}

fn require_body(body: &Bytes) -> Result<(), ApiError> {
    if body.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Empty upload body"));
    }
    debug!("Received upload of {} bytes", body.len());
    Ok(())
}

/// Run `work` on the upload written to a temporary WAV file
fn with_upload_file<T>(
    bytes: &[u8],
    work: impl FnOnce(&Path) -> Result<T, ApiError>,
) -> Result<T, ApiError> {
    // Removed when `file` drops
    let mut file = tempfile::Builder::new()
        .prefix("ser-upload-")
        .suffix(".wav")
        .tempfile()
        .map_err(|e| ApiError::internal(format!("Failed to create temp file: {}", e)))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| ApiError::internal(format!("Failed to write temp file: {}", e)))?;
    work(file.path())
}

fn analyse_upload(predictor: &Predictor, path: &Path) -> Result<ClipReport, ApiError> {
    let analysis = AudioOverview::from_file(path, &OverviewConfig::default())?;
    let mut prediction = predictor.predict(path)?;
    prediction.file = PathBuf::from("upload.wav");

    Ok(ClipReport {
        name: "upload.wav".to_string(),
        analysis,
        prediction,
    })
}

fn example_files(dir: &Path) -> Result<Vec<PathBuf>, ApiError> {
    collect_wav_files(dir).map_err(|e| {
        ApiError::internal(format!("Cannot read examples directory {:?}: {}", dir, e))
    })
}

/// Only names listed in the examples directory are served
fn resolve_example(dir: &Path, name: &str) -> Result<PathBuf, ApiError> {
    example_files(dir)?
        .into_iter()
        .find(|path| path.file_name().is_some_and(|f| f == name))
        .ok_or_else(|| ApiError::not_found(format!("Unknown example: {}", name)))
}

async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::internal(format!("Worker task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{reference_architecture, LoadPath, LoadedModel, SequentialModel};
    use std::time::Instant;
    use tempfile::tempdir;

    fn state_with_examples(dir: &Path) -> AppState {
        let model = SequentialModel::zeros(&reference_architecture()).unwrap();
        let loaded = LoadedModel::new(Box::new(model), LoadPath::Direct, PathBuf::from("zeros"));
        AppState {
            predictor: Arc::new(Predictor::new(Arc::new(loaded)).unwrap()),
            examples_dir: dir.to_path_buf(),
            started: Instant::now(),
        }
    }

    fn wav_bytes(secs: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..(16000.0 * secs) as usize {
                let s = (i as f32 * 0.05).sin() * 8000.0;
                writer.write_sample(s as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[tokio::test]
    async fn test_list_and_predict_example() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("03-01-05-01.wav"), wav_bytes(0.5)).unwrap();
        let state = state_with_examples(dir.path());

        let Json(listing) = list_examples(State(state.clone())).await.unwrap();
        assert_eq!(listing.examples.len(), 1);
        assert_eq!(listing.examples[0].name, "03-01-05-01.wav");

        let Json(result) = example_predict(State(state), UrlPath("03-01-05-01.wav".to_string()))
            .await
            .unwrap();
        assert_eq!(result.probs.len(), 8);
    }

    #[tokio::test]
    async fn test_unknown_example_is_404() {
        let dir = tempdir().unwrap();
        let state = state_with_examples(dir.path());
        let err = example_analysis(State(state), UrlPath("../secret.wav".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_roundtrip() {
        let dir = tempdir().unwrap();
        let state = state_with_examples(dir.path());
        let Json(report) = upload(State(state), Bytes::from(wav_bytes(1.0))).await.unwrap();
        assert_eq!(report.prediction.file, PathBuf::from("upload.wav"));
        assert_eq!(report.analysis.sample_rate, 22050);
        assert_eq!(report.analysis.mel_db.len(), 64);
    }

    #[tokio::test]
    async fn test_upload_analysis_without_prediction() {
        let Json(overview) = upload_analysis(Bytes::from(wav_bytes(1.0))).await.unwrap();
        assert_eq!(overview.sample_rate, 22050);
        assert!((overview.duration_secs - 1.0).abs() < 0.01);
        assert_eq!(overview.mel_db.len(), 64);
        assert!(!overview.waveform.is_empty());
    }

    #[tokio::test]
    async fn test_empty_upload_analysis_is_400() {
        let err = upload_analysis(Bytes::new()).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_example_audio_served_as_wav() {
        let dir = tempdir().unwrap();
        let bytes = wav_bytes(0.25);
        std::fs::write(dir.path().join("clip.wav"), &bytes).unwrap();
        let state = state_with_examples(dir.path());

        let response = example_audio(State(state.clone()), UrlPath("clip.wav".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.as_ref(), bytes.as_slice());

        match example_audio(State(state), UrlPath("other.wav".to_string())).await {
            Err(err) => assert_eq!(err.status, StatusCode::NOT_FOUND),
            Ok(_) => panic!("unlisted example was served"),
        }
    }

    #[tokio::test]
    async fn test_corrupt_upload_is_422() {
        let dir = tempdir().unwrap();
        let state = state_with_examples(dir.path());
        let err = upload(State(state), Bytes::from_static(b"RIFF....garbage"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_model_info() {
        let dir = tempdir().unwrap();
        let Json(info) = model_info(State(state_with_examples(dir.path()))).await;
        assert_eq!(info.output_width, 8);
        assert_eq!(info.labels.len(), 8);
    }
}
