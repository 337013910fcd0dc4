use thiserror::Error;

/// Discord user-gateway adapter error taxonomy (spec §4.7, §7).
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("serenity client error: {0}")]
    Client(#[from] serenity::Error),

    #[error(transparent)]
    Sync(#[from] scribe_sync::SyncError),
}

pub type Result<T> = std::result::Result<T, DiscordError>;

impl From<DiscordError> for scribe_sync::SyncError {
    fn from(e: DiscordError) -> Self {
        let rendered = e.to_string();
        match e {
            DiscordError::Client(_) => scribe_sync::SyncError::Transport(rendered),
            DiscordError::Sync(inner) => inner,
        }
    }
}
