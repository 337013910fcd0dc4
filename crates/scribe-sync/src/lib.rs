//! Shared sync-service contract (spec §4.6): the `SyncService` trait,
//! the uniform `start`/`stop`/`getStats` lifecycle, the reconnection
//! backoff policy, the in-process event bus and the per-account
//! `seenMessageIds` dedup cache every per-platform adapter builds on.

pub mod backoff;
pub mod error;
pub mod events;
pub mod registry;
pub mod seen;
pub mod service;
pub mod state;

pub use backoff::{ReconnectPolicy, DEFAULT_BASE_SECS, DEFAULT_MAX_ATTEMPTS};
pub use error::{Result, SyncError};
pub use events::{EventBus, SyncEvent};
pub use registry::SyncRegistry;
pub use seen::SeenIdCache;
pub use service::{SyncService, SyncStats};
pub use state::{SyncState, SyncStateCell};
