//! Batch runner
//!
//! Recognizes a set of photos with the configured engine pool and writes the
//! export for the images that produced a record.
//!
//! ```bash
//! geostamp-batch photos/ extra/IMG_0042.jpg --export-dir reports
//! ```

use anyhow::{bail, Context};
use chrono::Local;
use clap::Parser;
use geostamp_ocr::{
    app_state::AppState,
    config::AppConfig,
    services::{batch::ImageInput, export, ocr::WorkersAiFactory},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

#[derive(Parser, Debug)]
#[command(name = "geostamp-batch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Extract plus codes, coordinates and timestamps from inspection photos", long_about = None)]
struct Args {
    /// Image files, or directories whose image files are read one level deep
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Directory the export is written into
    #[arg(long, env = "EXPORT_DIR")]
    export_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let args = Args::parse();

    // Load configuration
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    if let Err(e) = run(&config, args).await {
        tracing::error!(error = format!("{e:#}"), "Batch run failed");
        return Err(e);
    }
    Ok(())
}

async fn run(config: &AppConfig, args: Args) -> anyhow::Result<()> {
    let images = load_images(&args.paths).await?;
    tracing::info!(images = images.len(), "Loaded batch");

    let factory = Arc::new(WorkersAiFactory {
        account_id: config.cf_account_id.clone(),
        api_token: config.cf_api_token.clone(),
        model: config.ocr_model.clone(),
    });
    let state = AppState::new(config, factory);

    let result = state
        .coordinator
        .process_batch_with_progress(images, |progress| {
            tracing::info!(
                completed = progress.completed,
                total = progress.total,
                image_name = %progress.image_name,
                succeeded = progress.succeeded,
                "Image processed"
            );
        })
        .await
        .context("Recognition pool unavailable")?;

    for failure in result.failures() {
        tracing::warn!(image_name = %failure.image_name, error = %failure.error, "Image failed");
    }

    let records = result.into_records();
    let Some(artifact) = export::build_artifact(&records, Local::now())? else {
        bail!("no image in the batch produced a record; nothing exported");
    };

    let export_dir = args.export_dir.as_deref().unwrap_or(&config.export_dir);
    let path = artifact
        .write_to(export_dir)
        .await
        .with_context(|| format!("Failed to write export into {}", export_dir.display()))?;
    println!("{}", path.display());
    Ok(())
}

/// Expand arguments into image files. Directories contribute their image
/// files, one level deep, in name order.
async fn load_images(args: &[PathBuf]) -> anyhow::Result<Vec<ImageInput>> {
    let mut paths = Vec::new();
    for arg in args {
        let metadata = tokio::fs::metadata(arg)
            .await
            .with_context(|| format!("Cannot read {}", arg.display()))?;
        if metadata.is_dir() {
            let mut found = Vec::new();
            let mut entries = tokio::fs::read_dir(arg).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_file() && is_image(&path) {
                    found.push(path);
                }
            }
            found.sort();
            paths.extend(found);
        } else {
            paths.push(arg.clone());
        }
    }

    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        images.push(ImageInput::new(name, bytes));
    }
    Ok(images)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
