use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::job::Diagnostics;
use crate::services::staging::{StagedImage, StagingError};

/// Text recognized from one image, before field extraction.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub text: String,
    pub diagnostics: Diagnostics,
}

/// One recognition engine instance. The pool never runs two jobs on the
/// same instance at once, so implementations may keep per-instance state.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn recognize(
        &self,
        image: &StagedImage,
        language: &str,
    ) -> Result<Recognition, RecognitionError>;
}

/// Builds engine instances for the pool.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(&self, index: usize) -> Result<Arc<dyn RecognitionEngine>, RecognitionError>;
}

/// Client for Cloudflare Workers AI vision models, prompted for verbatim transcription.
pub struct WorkersAiEngine {
    http: Client,
    name: String,
    url: String,
    api_token: String,
}

#[derive(Deserialize)]
struct WorkersAiResponse {
    success: bool,
    result: Option<WorkersAiResult>,
    #[serde(default)]
    errors: Vec<WorkersAiMessage>,
}

#[derive(Deserialize)]
struct WorkersAiResult {
    #[serde(alias = "response")]
    description: String,
}

#[derive(Deserialize)]
struct WorkersAiMessage {
    message: String,
}

impl WorkersAiEngine {
    pub fn new(
        index: usize,
        account_id: &str,
        api_token: &str,
        model: &str,
    ) -> Result<Self, RecognitionError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(RecognitionError::Http)?;

        Ok(Self {
            http,
            name: format!("workers-ai-{index}"),
            url: format!(
                "https://api.cloudflare.com/client/v4/accounts/{}/ai/run/{}",
                account_id, model
            ),
            api_token: api_token.to_string(),
        })
    }

    /// Client for a specific model endpoint, e.g. a gateway in front of Workers AI.
    pub fn with_endpoint(index: usize, url: &str, api_token: &str) -> Result<Self, RecognitionError> {
        let mut engine = Self::new(index, "", api_token, "")?;
        engine.url = url.to_string();
        Ok(engine)
    }
}

fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<WorkersAiResponse>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed
            .errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; "),
        _ => body.trim().chars().take(512).collect(),
    }
}

#[async_trait]
impl RecognitionEngine for WorkersAiEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(
        &self,
        image: &StagedImage,
        language: &str,
    ) -> Result<Recognition, RecognitionError> {
        let bytes = image.read().await?;
        image::guess_format(&bytes).map_err(|_| RecognitionError::UnsupportedImage)?;

        let prompt = format!(
            concat!(
                "Transcribe every piece of text visible in this photo exactly as written, ",
                "including coordinates, plus codes, addresses, dates and times. ",
                "Expected language: {}. Return only the transcribed text."
            ),
            language
        );

        let request_body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(&bytes),
            "prompt": prompt,
            "max_tokens": 512
        });

        let start = Instant::now();
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_token)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RecognitionError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let body: WorkersAiResponse = response.json().await?;
        if !body.success {
            let message = body
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RecognitionError::Api { status: status.as_u16(), message });
        }

        let text = body.result.map(|r| r.description).unwrap_or_default();

        Ok(Recognition {
            diagnostics: Diagnostics {
                engine: self.name.clone(),
                confidence: None,
                duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                warnings: if text.trim().is_empty() {
                    vec!["engine returned no text".to_string()]
                } else {
                    Vec::new()
                },
            },
            text,
        })
    }
}

/// Creates one Workers AI client per pool slot.
pub struct WorkersAiFactory {
    pub account_id: String,
    pub api_token: String,
    pub model: String,
}

#[async_trait]
impl EngineFactory for WorkersAiFactory {
    async fn create(&self, index: usize) -> Result<Arc<dyn RecognitionEngine>, RecognitionError> {
        let engine = WorkersAiEngine::new(index, &self.account_id, &self.api_token, &self.model)?;
        Ok(Arc::new(engine))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Recognition API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Image format not recognized")]
    UnsupportedImage,

    #[error("Recognition engine failed: {0}")]
    Engine(String),

    #[error("Recognition exceeded deadline of {0:?}")]
    TimedOut(Duration),

    #[error("Recognition engine panicked")]
    Panicked,

    #[error("Failed to stage image: {0}")]
    Staging(#[from] StagingError),
}
