use serde::{Serialize, Serializer};
use std::fmt::Display;
use uuid::Uuid;

/// Rendered in place of any field the extraction pipeline could not match.
pub const NOT_FOUND: &str = "Not found";

/// Structured fields recovered from one block of recognized text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    pub plus_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timestamp: Option<String>,
}

/// One successfully processed image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRecord {
    pub image_name: String,
    #[serde(serialize_with = "or_not_found")]
    pub plus_code: Option<String>,
    #[serde(serialize_with = "or_not_found")]
    pub latitude: Option<f64>,
    #[serde(serialize_with = "or_not_found")]
    pub longitude: Option<f64>,
    #[serde(serialize_with = "or_not_found")]
    pub timestamp: Option<String>,
    pub original_text: String,
}

impl ExtractedRecord {
    pub fn new(image_name: impl Into<String>, fields: ExtractedFields, original_text: String) -> Self {
        Self {
            image_name: image_name.into(),
            plus_code: fields.plus_code,
            latitude: fields.latitude,
            longitude: fields.longitude,
            timestamp: fields.timestamp,
            original_text,
        }
    }

    /// Export columns in order: plus code, latitude, longitude, timestamp, image name.
    pub fn export_row(&self) -> [String; 5] {
        [
            display_or_not_found(self.plus_code.as_ref()),
            display_or_not_found(self.latitude.as_ref()),
            display_or_not_found(self.longitude.as_ref()),
            display_or_not_found(self.timestamp.as_ref()),
            self.image_name.clone(),
        ]
    }
}

/// An image whose recognition call failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingFailure {
    pub image_name: String,
    pub job_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchEntry {
    Extracted(ExtractedRecord),
    Failed(ProcessingFailure),
}

impl BatchEntry {
    pub fn image_name(&self) -> &str {
        match self {
            BatchEntry::Extracted(record) => &record.image_name,
            BatchEntry::Failed(failure) => &failure.image_name,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BatchEntry::Extracted(_))
    }
}

/// Outcome of one batch, one entry per input image in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub entries: Vec<BatchEntry>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &ExtractedRecord> {
        self.entries.iter().filter_map(|entry| match entry {
            BatchEntry::Extracted(record) => Some(record),
            BatchEntry::Failed(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProcessingFailure> {
        self.entries.iter().filter_map(|entry| match entry {
            BatchEntry::Failed(failure) => Some(failure),
            BatchEntry::Extracted(_) => None,
        })
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    /// Records handed to the export step.
    pub fn into_records(self) -> Vec<ExtractedRecord> {
        self.entries
            .into_iter()
            .filter_map(|entry| match entry {
                BatchEntry::Extracted(record) => Some(record),
                BatchEntry::Failed(_) => None,
            })
            .collect()
    }
}

fn display_or_not_found<T: Display>(value: Option<&T>) -> String {
    value.map_or_else(|| NOT_FOUND.to_string(), ToString::to_string)
}

fn or_not_found<T: Display, S: Serializer>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&display_or_not_found(value.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(plus_code: Option<&str>, latitude: Option<f64>) -> ExtractedRecord {
        ExtractedRecord::new(
            "site-04.jpg",
            ExtractedFields {
                plus_code: plus_code.map(str::to_string),
                latitude,
                longitude: None,
                timestamp: None,
            },
            "raw".to_string(),
        )
    }

    #[test]
    fn test_export_row_uses_sentinel() {
        let row = record(None, Some(31.5204)).export_row();
        assert_eq!(row[0], NOT_FOUND);
        assert_eq!(row[1], "31.5204");
        assert_eq!(row[2], NOT_FOUND);
        assert_eq!(row[3], NOT_FOUND);
        assert_eq!(row[4], "site-04.jpg");
    }

    #[test]
    fn test_json_uses_sentinel() {
        let json = serde_json::to_value(BatchEntry::Extracted(record(Some("9AB8+2X"), None)))
            .expect("serialize");
        assert_eq!(json["outcome"], "extracted");
        assert_eq!(json["plus_code"], "9AB8+2X");
        assert_eq!(json["latitude"], NOT_FOUND);
    }

    #[test]
    fn test_batch_partitions() {
        let result = BatchResult {
            entries: vec![
                BatchEntry::Extracted(record(None, None)),
                BatchEntry::Failed(ProcessingFailure {
                    image_name: "broken.png".to_string(),
                    job_id: Uuid::new_v4(),
                    error: "engine error".to_string(),
                }),
            ],
        };
        assert_eq!(result.success_count(), 1);
        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.failures().next().map(|f| f.image_name.as_str()), Some("broken.png"));
        assert_eq!(result.into_records().len(), 1);
    }
}
