//! WhatsApp sync service: web-protocol library consumed over a local
//! WebSocket bridge (spec §4.7).

pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;

pub use error::{Result, WhatsAppError};
pub use service::WhatsAppSyncService;
