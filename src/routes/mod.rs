pub mod health;
pub mod metrics;
pub mod progress;
pub mod upload;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Build the application router with its middleware stack.
pub fn router(state: AppState) -> Router {
    let public_path = state.config.public_path.clone();
    let artifacts = ServeDir::new(&state.config.output_dir);
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_check))
        .route("/upload", post(upload::submit_upload))
        .route("/progress/{job_id}", get(progress::get_progress))
        .nest_service(&public_path, artifacts)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
}
