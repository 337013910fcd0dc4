use thiserror::Error;

/// Top-level error taxonomy for the ingestion engine (spec §7).
///
/// Per-crate errors (`EventLogError`, `ChannelError`, …) convert into this
/// type at the façade boundary via `#[from]` so callers at the edge of the
/// system see one enum instead of threading every subsystem's error type.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed input to a store API: unknown `kind`, non-monotonic
    /// timestamp, or a CID that fails `is_valid_cid`. Never retried
    /// internally.
    #[error("validation error: {0}")]
    Validation(String),

    /// Event/content/view write failure. The content blob is always
    /// written before the event, so a retry after an `IOError` is safe.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transient loss of a sync service's transport. Handled internally
    /// by the reconnection state machine; never fatal to the service.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed event line, blob header, or platform payload. The
    /// record is skipped and processing continues.
    #[error("parse error: {0}")]
    Parse(String),

    /// Missing required credentials or device. Fatal at `start()` time.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IngestError {
    /// Short error code, used for logging/metrics tagging only — never
    /// for control flow.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Validation(_) => "VALIDATION_ERROR",
            IngestError::Io(_) => "IO_ERROR",
            IngestError::Transport(_) => "TRANSPORT_ERROR",
            IngestError::Parse(_) => "PARSE_ERROR",
            IngestError::Config(_) => "CONFIG_ERROR",
            IngestError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
