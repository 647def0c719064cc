use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use crate::models::record::ExtractedRecord;

pub const COLUMNS: [&str; 5] = ["Location/Plus Code", "Latitude", "Longitude", "Timestamp", "PICS"];

pub const CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Byte-order mark so spreadsheet tools read the file as UTF-8.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A rendered export ready to be downloaded or written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.bytes).await?;
        tracing::info!(path = %path.display(), bytes = self.bytes.len(), "Export written");
        Ok(path)
    }
}

/// Build the export for a batch's successful records.
///
/// Returns `Ok(None)` when there is nothing to export, so callers never
/// produce an empty file.
pub fn build_artifact(
    records: &[ExtractedRecord],
    now: DateTime<Local>,
) -> Result<Option<ExportArtifact>, ExportError> {
    if records.is_empty() {
        return Ok(None);
    }

    Ok(Some(ExportArtifact {
        file_name: format!("plus_codes_{}.csv", now.format("%Y%m%d_%H%M%S")),
        content_type: CONTENT_TYPE,
        bytes: render_csv(records)?,
    }))
}

/// Header row plus one row per record, CRLF-terminated, behind a UTF-8 BOM.
pub fn render_csv(records: &[ExtractedRecord]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(UTF8_BOM.to_vec());

    writer.write_record(COLUMNS)?;
    for record in records {
        writer.write_record(record.export_row())?;
    }

    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode CSV: {0}")]
    Csv(#[from] csv::Error),
}
