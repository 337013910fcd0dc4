use thiserror::Error;

use scribe_core::IngestError;

/// Storage-layer error taxonomy (spec §4.2, §4.3, §7).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed event log record: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Io(_) => "IO_ERROR",
            StoreError::Parse(_) => "PARSE_ERROR",
            StoreError::Validation(_) => "VALIDATION_ERROR",
            StoreError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(e) => IngestError::Io(e),
            StoreError::Parse(msg) => IngestError::Parse(msg),
            StoreError::Validation(msg) => IngestError::Validation(msg),
            StoreError::Serialization(e) => IngestError::Serialization(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
