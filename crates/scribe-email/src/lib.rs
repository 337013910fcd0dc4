//! Email sync service: IMAP IDLE preferred, UID-poll fallback, one
//! connection per configured account (spec §4.7).

pub mod error;
pub mod parse;
pub mod service;
pub mod transport;

pub use error::{EmailError, Result};
pub use service::EmailSyncService;
