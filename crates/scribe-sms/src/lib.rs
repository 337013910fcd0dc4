//! SMS sync service: mobile bridge over D-Bus, signal-push preferred
//! with periodic re-enumeration fallback (spec §4.7).

pub mod error;
pub mod parse;
pub mod service;
pub mod transport;

pub use error::{Result, SmsError};
pub use service::{HistoricImportFilter, HistoricImportStats, SmsSyncService};
