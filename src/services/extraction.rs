use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::RangeInclusive;

use crate::models::record::ExtractedFields;

/// Open location code body: 4-8 characters, `+`, 2-4 characters.
static PLUS_CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[A-Z0-9]{4,8}\+[A-Z0-9]{2,4}").unwrap());

/// Address words that follow a plus code, e.g. ` Lahore, Punjab`.
static ADDRESS_SUFFIX_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[\s,]+[A-Za-z0-9]{2,})+").unwrap());

/// Decimal degrees, tolerating a comma as the decimal separator.
static COORDINATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?[0-9]{1,3}[.,][0-9]{3,12}").unwrap());

const DATE: &str = r"[0-9]{1,2}/[0-9]{1,2}/[0-9]{2,4}";
const TIME_12H: &str = r"(?:0?[1-9]|1[0-2]):[0-5][0-9](?::[0-5][0-9])?(?:\s?[AaPp][Mm])?";
const TIME_24H: &str = r"(?:[01]?[0-9]|2[0-3]):[0-5][0-9](?::[0-5][0-9])?";

/// Tried in order; the first shape found anywhere in the text wins.
static TIMESTAMP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        (TIME_12H, DATE),
        (DATE, TIME_12H),
        (TIME_24H, DATE),
        (DATE, TIME_24H),
    ]
    .iter()
    .map(|(first, second)| {
        Regex::new(&format!(r"\b({first}),?\s+({second})\b")).unwrap()
    })
    .collect()
});

/// Coordinate windows of the deployment region.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateRegion {
    pub latitude: RangeInclusive<f64>,
    pub longitude: RangeInclusive<f64>,
}

impl Default for CoordinateRegion {
    fn default() -> Self {
        Self {
            latitude: 23.0..=37.0,
            longitude: 60.0..=78.0,
        }
    }
}

/// Recover plus code, coordinates and timestamp from raw recognized text.
///
/// Each step runs over the whitespace-normalized text and is independent of
/// the others. Absent fields come back as `None`.
pub fn extract(raw_text: &str, region: &CoordinateRegion) -> ExtractedFields {
    let text = normalize(raw_text);
    let (latitude, longitude) = find_coordinates(&text, region);

    ExtractedFields {
        plus_code: find_plus_code(&text),
        latitude,
        longitude,
        timestamp: find_timestamp(&text),
    }
}

/// Collapse newlines and whitespace runs into single spaces.
pub fn normalize(raw_text: &str) -> String {
    raw_text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First plus code in the text plus any trailing address words.
pub fn find_plus_code(text: &str) -> Option<String> {
    let code = PLUS_CODE_PATTERN.find(text)?;
    let rest = &text[code.end()..];
    let suffix = ADDRESS_SUFFIX_PATTERN
        .find(rest)
        .map(|m| m.as_str().trim_end_matches(|c: char| c.is_whitespace() || c == ','))
        .unwrap_or_default();

    Some(format!("{}{}", code.as_str(), suffix))
}

/// First latitude and first longitude candidate inside the region, in scan order.
pub fn find_coordinates(text: &str, region: &CoordinateRegion) -> (Option<f64>, Option<f64>) {
    let candidates: Vec<f64> = COORDINATE_PATTERN
        .find_iter(text)
        .filter_map(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
        .collect();

    let latitude = candidates.iter().copied().find(|v| region.latitude.contains(v));
    let longitude = candidates.iter().copied().find(|v| region.longitude.contains(v));
    (latitude, longitude)
}

/// Time and date pair, joined by a single space.
pub fn find_timestamp(text: &str) -> Option<String> {
    TIMESTAMP_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(text)
            .map(|caps| format!("{} {}", &caps[1], &caps[2]).trim().to_string())
    })
}
