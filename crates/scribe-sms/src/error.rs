use thiserror::Error;

/// Mobile-bridge (D-Bus) adapter error taxonomy (spec §4.7, §7).
#[derive(Debug, Error)]
pub enum SmsError {
    /// No paired device supports SMS and none was configured — fatal at
    /// `start()` (spec §4.7 "Failure to locate a device on start is
    /// fatal").
    #[error("no SMS-capable device found")]
    NoDevice,

    #[error("D-Bus error: {0}")]
    DBus(#[from] zbus::Error),

    #[error(transparent)]
    Sync(#[from] scribe_sync::SyncError),
}

pub type Result<T> = std::result::Result<T, SmsError>;

impl From<SmsError> for scribe_sync::SyncError {
    fn from(e: SmsError) -> Self {
        let rendered = e.to_string();
        match e {
            SmsError::NoDevice => scribe_sync::SyncError::Config(rendered),
            SmsError::DBus(_) => scribe_sync::SyncError::Transport(rendered),
            SmsError::Sync(inner) => inner,
        }
    }
}
