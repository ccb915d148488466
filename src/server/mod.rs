//! HTTP interface: model info, bundled examples and uploads.

pub mod handlers;
pub mod types;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::emotion::Predictor;

/// Shared state for the HTTP server
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<Predictor>,
    pub examples_dir: PathBuf,
    pub started: Instant,
}

impl AppState {
    pub fn new(predictor: Arc<Predictor>, examples_dir: PathBuf) -> Self {
        Self {
            predictor,
            examples_dir,
            started: Instant::now(),
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/api/model", get(handlers::model_info))
        .route("/api/emotions", get(handlers::emotions))
        .route("/api/examples", get(handlers::list_examples))
        .route("/api/examples/:name/audio", get(handlers::example_audio))
        .route("/api/examples/:name/analysis", get(handlers::example_analysis))
        .route("/api/examples/:name/predict", post(handlers::example_predict))
        .route("/api/upload", post(handlers::upload))
        .route("/api/upload/analysis", post(handlers::upload_analysis))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Serve until Ctrl-C
pub async fn serve(addr: SocketAddr, state: AppState, max_upload_bytes: usize) -> std::io::Result<()> {
    let app = router(state, max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Emotion recognition server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down server");
        })
        .await
}
