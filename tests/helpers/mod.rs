//! Scripted recognition engines for exercising the pool and coordinator
//! without a live recognition service.

use async_trait::async_trait;
use geostamp_ocr::config::AppConfig;
use geostamp_ocr::models::job::Diagnostics;
use geostamp_ocr::services::ocr::{EngineFactory, Recognition, RecognitionEngine, RecognitionError};
use geostamp_ocr::services::staging::StagedImage;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared script for every engine a [`ScriptedFactory`] builds.
#[derive(Default)]
pub struct Script {
    /// Images whose next recognition fails once, then succeeds.
    pub transient_failures: Mutex<HashSet<String>>,
    pub engines_created: AtomicUsize,
    pub calls: AtomicUsize,
}

impl Script {
    pub fn fail_once(&self, image_text: &str) {
        self.transient_failures
            .lock()
            .expect("script lock")
            .insert(image_text.to_string());
    }
}

/// Returns the image bytes as text, after a short delay.
pub struct ScriptedEngine {
    name: String,
    script: Arc<Script>,
}

#[async_trait]
impl RecognitionEngine for ScriptedEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(
        &self,
        image: &StagedImage,
        _language: &str,
    ) -> Result<Recognition, RecognitionError> {
        self.script.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(15)).await;

        let text = String::from_utf8_lossy(&image.read().await?).to_string();
        if self
            .script
            .transient_failures
            .lock()
            .expect("script lock")
            .remove(&text)
        {
            return Err(RecognitionError::Engine("resource exhausted".to_string()));
        }

        Ok(Recognition {
            text,
            diagnostics: Diagnostics {
                engine: self.name.clone(),
                confidence: Some(0.9),
                ..Diagnostics::default()
            },
        })
    }
}

pub struct ScriptedFactory {
    pub script: Arc<Script>,
}

#[async_trait]
impl EngineFactory for ScriptedFactory {
    async fn create(&self, index: usize) -> Result<Arc<dyn RecognitionEngine>, RecognitionError> {
        tokio::time::sleep(Duration::from_millis(25)).await;
        self.script.engines_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedEngine {
            name: format!("scripted-{index}"),
            script: Arc::clone(&self.script),
        }))
    }
}

/// A factory whose engines can never be built.
pub struct UnavailableFactory;

#[async_trait]
impl EngineFactory for UnavailableFactory {
    async fn create(&self, _index: usize) -> Result<Arc<dyn RecognitionEngine>, RecognitionError> {
        Err(RecognitionError::Engine("model weights not found".to_string()))
    }
}

/// Configuration with defaults and a private staging directory.
pub fn test_config() -> AppConfig {
    let staging: PathBuf =
        std::env::temp_dir().join(format!("geostamp-it-{}", uuid::Uuid::new_v4()));
    let vars = vec![
        ("CF_ACCOUNT_ID".to_string(), "test-account".to_string()),
        ("CF_API_TOKEN".to_string(), "test-token".to_string()),
        ("STAGING_DIR".to_string(), staging.display().to_string()),
    ];
    envy::from_iter(vars).expect("test config")
}
