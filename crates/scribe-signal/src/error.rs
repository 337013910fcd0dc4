use thiserror::Error;

/// Signal-adapter error taxonomy, converting into [`scribe_sync::SyncError`]
/// at the `SyncService` boundary (spec §4.7, §7).
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("signal-cli daemon failed to start within timeout")]
    DaemonStartTimeout,

    #[error("no Signal phone number configured")]
    MissingPhone,

    #[error("subprocess error: {0}")]
    Subprocess(String),

    #[error(transparent)]
    Sync(#[from] scribe_sync::SyncError),
}

pub type Result<T> = std::result::Result<T, SignalError>;

impl From<SignalError> for scribe_sync::SyncError {
    fn from(e: SignalError) -> Self {
        let rendered = e.to_string();
        match e {
            SignalError::DaemonStartTimeout => scribe_sync::SyncError::Transport(rendered),
            SignalError::MissingPhone => scribe_sync::SyncError::Config(rendered),
            SignalError::Subprocess(_) => scribe_sync::SyncError::Transport(rendered),
            SignalError::Sync(inner) => inner,
        }
    }
}
