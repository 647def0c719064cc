use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Local;
use serde::Serialize;

use crate::app_state::AppState;
use crate::models::record::{BatchEntry, BatchResult, ProcessingFailure};
use crate::services::batch::ImageInput;
use crate::services::export;

/// Response for a processed batch.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub entries: Vec<BatchEntry>,
}

impl From<BatchResult> for BatchResponse {
    fn from(result: BatchResult) -> Self {
        Self {
            total: result.len(),
            succeeded: result.success_count(),
            failed: result.failure_count(),
            entries: result.entries,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ProcessingFailure>,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    let body = ErrorResponse {
        error: error.into(),
        failures: Vec::new(),
    };
    (status, Json(body)).into_response()
}

/// POST /api/v1/batch — Recognize a batch of images and return every outcome.
pub async fn process_batch(State(state): State<AppState>, multipart: Multipart) -> Response {
    let result = match run_batch(&state, multipart).await {
        Ok(result) => result,
        Err(response) => return response,
    };

    Json(BatchResponse::from(result)).into_response()
}

/// POST /api/v1/batch/export — Recognize a batch and download the successes as CSV.
pub async fn export_batch(State(state): State<AppState>, multipart: Multipart) -> Response {
    let result = match run_batch(&state, multipart).await {
        Ok(result) => result,
        Err(response) => return response,
    };

    let failures: Vec<ProcessingFailure> = result.failures().cloned().collect();
    let records = result.into_records();

    match export::build_artifact(&records, Local::now()) {
        Ok(Some(artifact)) => {
            tracing::info!(
                file_name = %artifact.file_name,
                records = records.len(),
                failed = failures.len(),
                "Serving batch export"
            );
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, artifact.content_type.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", artifact.file_name),
                    ),
                ],
                artifact.bytes,
            )
                .into_response()
        }
        Ok(None) => {
            tracing::warn!(failed = failures.len(), "No image in batch produced a record");
            let body = ErrorResponse {
                error: "No image in the batch produced a record; nothing to export".to_string(),
                failures,
            };
            (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to render batch export");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn run_batch(state: &AppState, multipart: Multipart) -> Result<BatchResult, Response> {
    let images = read_images(multipart).await?;
    if images.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "No images uploaded"));
    }

    state
        .coordinator
        .process_batch(images)
        .await
        .map_err(|e| error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
}

/// Every file part in the upload is one image, named by its file name.
async fn read_images(mut multipart: Multipart) -> Result<Vec<ImageInput>, Response> {
    let mut images = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.body_text()))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.body_text()))?;

        let name = if file_name.trim().is_empty() {
            format!("image-{}", images.len() + 1)
        } else {
            file_name
        };

        // Unrecognized formats still go through so they fail as that image's outcome.
        if image::guess_format(&data).is_err() {
            tracing::warn!(image_name = %name, "Upload is not a recognized image format");
        }

        images.push(ImageInput::new(name, data.to_vec()));
    }

    Ok(images)
}
