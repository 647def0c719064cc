use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::Display;
use uuid::Uuid;

/// Lifecycle of a recognition job inside the engine pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Pending,
    Resolved,
    Rejected,
}

/// One input image submitted for recognition.
#[derive(Debug, Clone)]
pub struct RecognitionJob {
    pub id: Uuid,
    pub image_name: String,
    pub image: Arc<[u8]>,
    pub submitted_at: DateTime<Utc>,
}

impl RecognitionJob {
    pub fn new(image_name: impl Into<String>, image: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            image_name: image_name.into(),
            image: image.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// Engine-side details reported alongside recognized text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub engine: String,
    pub confidence: Option<f32>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
}

/// Text produced by one engine for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecognitionResult {
    pub source_job_id: Uuid,
    pub recognized_text: String,
    pub diagnostics: Diagnostics,
}
