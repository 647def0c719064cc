//! Inspection photo OCR
//!
//! Recognizes the text stamped onto batches of inspection photos through a
//! bounded pool of recognition engines, then recovers plus codes, coordinates
//! and timestamps from that text for tabular export.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
