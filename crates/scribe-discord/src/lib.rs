//! Discord sync service: single user-gateway connection via `serenity`
//! (spec §4.7).

pub mod content;
pub mod error;
pub mod service;
pub mod transport;

pub use error::{DiscordError, Result};
pub use service::DiscordSyncService;
