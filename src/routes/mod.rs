use axum::extract::DefaultBodyLimit;
use axum::{routing::get, routing::post, Router};
use tower_http::limit::RequestBodyLimitLayer;

use crate::app_state::AppState;

pub mod batch;
pub mod health;
pub mod metrics;

/// Uploads carry whole photo batches.
pub const MAX_BATCH_BYTES: usize = 64 * 1024 * 1024;

/// Health and batch endpoints over shared state.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/batch", post(batch::process_batch))
        .route("/api/v1/batch/export", post(batch::export_batch))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BATCH_BYTES))
        .with_state(state)
}
