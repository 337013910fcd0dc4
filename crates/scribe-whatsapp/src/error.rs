use thiserror::Error;

/// WhatsApp web-protocol adapter error taxonomy (spec §4.7, §7).
#[derive(Debug, Error)]
pub enum WhatsAppError {
    #[error("session file not found or unreadable: {0}")]
    MissingSession(String),

    #[error("web-protocol socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Sync(#[from] scribe_sync::SyncError),
}

pub type Result<T> = std::result::Result<T, WhatsAppError>;

impl From<WhatsAppError> for scribe_sync::SyncError {
    fn from(e: WhatsAppError) -> Self {
        let rendered = e.to_string();
        match e {
            WhatsAppError::MissingSession(_) => scribe_sync::SyncError::Config(rendered),
            WhatsAppError::Socket(_) => scribe_sync::SyncError::Transport(rendered),
            WhatsAppError::Sync(inner) => inner,
        }
    }
}
