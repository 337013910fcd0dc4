use thiserror::Error;

/// IMAP adapter error taxonomy (spec §4.7, §7).
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("imap error ({account}): {source}")]
    Imap { account: String, source: async_imap::error::Error },

    #[error("tls error ({account}): {message}")]
    Tls { account: String, message: String },

    #[error(transparent)]
    Sync(#[from] scribe_sync::SyncError),
}

pub type Result<T> = std::result::Result<T, EmailError>;

impl From<EmailError> for scribe_sync::SyncError {
    fn from(e: EmailError) -> Self {
        let rendered = e.to_string();
        match e {
            EmailError::Imap { .. } => scribe_sync::SyncError::Transport(rendered),
            EmailError::Tls { .. } => scribe_sync::SyncError::Config(rendered),
            EmailError::Sync(inner) => inner,
        }
    }
}
