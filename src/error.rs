//! Error types for Synheart Mood

use thiserror::Error;

/// Errors that can occur while ingesting, deriving, or inferring
#[derive(Debug, Error)]
pub enum MoodError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Unsupported upload: {0}")]
    UnsupportedUpload(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Date parse error: {0}")]
    InvalidDate(String),

    #[error("Invalid mood label: {0}")]
    InvalidLabel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upload pipeline failed: {message}")]
    Pipeline { message: String },
}

impl From<rusqlite::Error> for MoodError {
    fn from(e: rusqlite::Error) -> Self {
        MoodError::Storage(e.to_string())
    }
}

impl From<zip::result::ZipError> for MoodError {
    fn from(e: zip::result::ZipError) -> Self {
        MoodError::Archive(e.to_string())
    }
}
