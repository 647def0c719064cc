use garde::Validate;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::extraction::CoordinateRegion;

#[derive(Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the CLI runner.
    #[serde(default = "default_bind_addr")]
    #[garde(skip)]
    pub bind_addr: String,

    /// Cloudflare account ID
    #[garde(length(min = 1))]
    pub cf_account_id: String,

    /// Cloudflare Workers AI API token
    #[garde(length(min = 1))]
    pub cf_api_token: String,

    /// Workers AI model used for text recognition
    #[serde(default = "default_ocr_model")]
    #[garde(length(min = 1))]
    pub ocr_model: String,

    /// Language/script hint passed to every recognition call
    #[serde(default = "default_ocr_language")]
    #[garde(length(min = 1, max = 32))]
    pub ocr_language: String,

    /// Number of recognition engines in the shared pool
    #[serde(default = "default_ocr_pool_size")]
    #[garde(range(min = 1, max = 16))]
    pub ocr_pool_size: usize,

    /// Per-job recognition deadline in seconds. Unset means no deadline.
    #[serde(default)]
    #[garde(range(min = 1))]
    pub ocr_job_timeout_secs: Option<u64>,

    /// Directory for per-job staged images
    #[serde(default = "default_staging_dir")]
    #[garde(skip)]
    pub staging_dir: PathBuf,

    /// Directory the CLI runner writes exports into
    #[serde(default = "default_export_dir")]
    #[garde(skip)]
    pub export_dir: PathBuf,

    #[serde(default = "default_latitude_min")]
    #[garde(skip)]
    pub latitude_min: f64,

    #[serde(default = "default_latitude_max")]
    #[garde(skip)]
    pub latitude_max: f64,

    #[serde(default = "default_longitude_min")]
    #[garde(skip)]
    pub longitude_min: f64,

    #[serde(default = "default_longitude_max")]
    #[garde(skip)]
    pub longitude_max: f64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_ocr_model() -> String {
    "@cf/llava-hf/llava-1.5-7b-hf".to_string()
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

fn default_ocr_pool_size() -> usize {
    3
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("geostamp-staging")
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}

fn default_latitude_min() -> f64 {
    23.0
}

fn default_latitude_max() -> f64 {
    37.0
}

fn default_longitude_min() -> f64 {
    60.0
}

fn default_longitude_max() -> f64 {
    78.0
}

fn check_range(axis: &'static str, min: f64, max: f64, limit: f64) -> Result<(), ConfigError> {
    if !min.is_finite() || !max.is_finite() || min > max || min < -limit || max > limit {
        return Err(ConfigError::Range { axis, min, max });
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),

    #[error("Invalid coordinate range for {axis}: [{min}, {max}]")]
    Range { axis: &'static str, min: f64, max: f64 },
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.check()?;
        Ok(config)
    }

    /// Field rules plus the cross-field coordinate range checks.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        check_range("latitude", self.latitude_min, self.latitude_max, 90.0)?;
        check_range("longitude", self.longitude_min, self.longitude_max, 180.0)?;
        Ok(())
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.ocr_job_timeout_secs.map(Duration::from_secs)
    }

    pub fn region(&self) -> CoordinateRegion {
        CoordinateRegion {
            latitude: self.latitude_min..=self.latitude_max,
            longitude: self.longitude_min..=self.longitude_max,
        }
    }
}
