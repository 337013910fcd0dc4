use thiserror::Error;

use scribe_core::IngestError;

/// Sync-service error taxonomy (spec §4.6, §7).
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transient loss of transport; handled internally by the
    /// reconnection state machine and never fatal to the service.
    #[error("transport error: {0}")]
    Transport(String),

    /// Missing required credentials or device; fatal at `start()` time.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed platform payload; the record is skipped.
    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Store(#[from] scribe_store::StoreError),
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Transport(_) => "TRANSPORT_ERROR",
            SyncError::Config(_) => "CONFIG_ERROR",
            SyncError::Parse(_) => "PARSE_ERROR",
            SyncError::Store(e) => e.code(),
        }
    }
}

impl From<SyncError> for IngestError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Transport(msg) => IngestError::Transport(msg),
            SyncError::Config(msg) => IngestError::Config(msg),
            SyncError::Parse(msg) => IngestError::Parse(msg),
            SyncError::Store(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
