//! Uniform lifecycle contract every per-platform adapter implements
//! (spec §4.6).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::events::EventBus;
use crate::state::ModeLabel;

/// Snapshot of a sync service's runtime counters, returned by
/// `get_stats()` (spec §4.6). Per-platform adapters may stash extra
/// per-account detail behind `Box<dyn std::fmt::Debug>`-free extension
/// points in their own types; this struct carries the fields every
/// service shares.
#[derive(Debug, Clone)]
pub struct SyncStats {
    /// `"stopped"` or a transport-specific live mode (`idle`, `polling`,
    /// `daemon`, `cli`, `monitoring`, `realtime`, `syncing`, `importing`).
    pub mode: ModeLabel,
    pub messages_processed: u64,
    pub errors: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_sync: Option<DateTime<Utc>>,
    pub reconnect_attempts: u32,
    /// Platform-specific counters that don't warrant a dedicated field
    /// on every adapter (e.g. Discord's `guildsProcessed`, spec §4.7).
    pub extra: BTreeMap<String, u64>,
}

impl SyncStats {
    pub fn stopped() -> Self {
        Self {
            mode: "stopped",
            messages_processed: 0,
            errors: 0,
            started_at: None,
            last_sync: None,
            reconnect_attempts: 0,
            extra: BTreeMap::new(),
        }
    }
}

/// Common interface implemented by every per-platform sync adapter
/// (Email, SMS, Signal, WhatsApp, Discord) — spec §4.6.
///
/// Implementations must be `Send + Sync` so a [`SyncRegistry`](crate::registry::SyncRegistry)
/// can hold them and drive each from its own Tokio task.
#[async_trait]
pub trait SyncService: Send + Sync {
    /// Stable lowercase platform name (e.g. `"signal"`), used as the
    /// registry key and in log fields.
    fn name(&self) -> &str;

    /// Establish transport(s) and begin emitting messages onto this
    /// service's [`EventBus`]. Idempotent: a second call while already
    /// running is a no-op (spec §4.6).
    async fn start(&self) -> Result<()>;

    /// Tear down transports, clear timers, detach every listener handle,
    /// and suppress further emissions. Cooperative-soft: active fetches
    /// complete before the call returns (spec §5).
    async fn stop(&self) -> Result<()>;

    /// Current runtime counters (spec §4.6).
    fn get_stats(&self) -> SyncStats;

    /// The bus this service publishes [`SyncEvent`](crate::events::SyncEvent)s
    /// onto. Callers subscribe once; unsubscription happens by dropping
    /// the receiver, which must occur no later than the paired `stop()`
    /// (spec §9 "unsubscription must be total").
    fn events(&self) -> EventBus;
}
