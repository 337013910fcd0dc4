//! SMS sync service (spec §4.7): subscribes to the mobile bridge's
//! `conversationUpdated` D-Bus signal, with periodic full-conversation
//! re-enumeration as a fallback for missed signals.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use scribe_core::config::MobileBridgeConfig;
use scribe_core::ids;
use scribe_store::{CreateMessageOptions, MessageStore};
use scribe_sync::{EventBus, ReconnectPolicy, SyncError, SyncEvent, SyncService, SyncState, SyncStateCell, SyncStats};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};
use zbus::Connection;

use crate::error::SmsError;
use crate::parse::{self, BridgeMessage};
use crate::transport::{self, SmsDevice};

/// Scoping for [`SmsSyncService::historic_import`] (spec §4.7 "Historic
/// import"): `since`/`until` are millisecond timestamps, `thread_ids`
/// narrows the backfill to specific conversations (bridge-native thread
/// IDs). `None` on any field means "unbounded" for that axis.
#[derive(Debug, Clone, Default)]
pub struct HistoricImportFilter {
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub thread_ids: Option<Vec<String>>,
}

fn in_range(filter: &HistoricImportFilter, date: i64) -> bool {
    if let Some(since) = filter.since {
        if date < since {
            return false;
        }
    }
    if let Some(until) = filter.until {
        if date > until {
            return false;
        }
    }
    true
}

/// Progress counters for one `historic_import` run (spec §4.7 "Emits
/// progress counts").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoricImportStats {
    pub conversations: u64,
    pub messages: u64,
    pub errors: u64,
}

pub struct SmsSyncService {
    config: MobileBridgeConfig,
    store: Arc<MessageStore>,
    bus: EventBus,
    state: Arc<SyncStateCell>,
    messages_processed: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    reconnect_attempts: Arc<AtomicU32>,
    started_at: Arc<Mutex<Option<chrono::DateTime<Utc>>>>,
    last_sync: Arc<Mutex<Option<chrono::DateTime<Utc>>>>,
    seen: Arc<scribe_sync::SeenIdCache<String>>,
    running: Arc<std::sync::atomic::AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SmsSyncService {
    pub fn new(config: &MobileBridgeConfig, store: Arc<MessageStore>) -> Self {
        Self {
            config: config.clone(),
            store,
            bus: EventBus::new(),
            state: Arc::new(SyncStateCell::new()),
            messages_processed: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
            reconnect_attempts: Arc::new(AtomicU32::new(0)),
            started_at: Arc::new(Mutex::new(None)),
            last_sync: Arc::new(Mutex::new(None)),
            seen: Arc::new(scribe_sync::SeenIdCache::new()),
            running: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    async fn ingest(&self, account_id: &str, msg: &BridgeMessage) {
        let native_id = format!("{}:{}", msg.address, msg.id);
        if self.seen.check_and_insert(native_id) {
            return; // already observed this native message id
        }
        let Some(input) = parse::to_message_input(account_id, msg) else {
            return; // empty body, nothing to archive
        };
        match self.store.create_message(input, CreateMessageOptions { skip_thread_update: false }) {
            Ok(message) => {
                self.messages_processed.fetch_add(1, Ordering::SeqCst);
                *self.last_sync.lock().await = Some(Utc::now());
                self.bus.publish(SyncEvent::Message(message));
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::SeqCst);
                warn!(error = %e, "sms: failed to store message");
            }
        }
    }

    async fn run(&self, conn: Connection, device: SmsDevice) {
        let account_id = ids::account_id_sms(&device.id);
        let policy = ReconnectPolicy::new(self.config.reconnect_backoff_secs, self.config.max_reconnect_attempts);
        let mut attempt: u32 = 0;

        while self.running.load(Ordering::SeqCst) {
            let proxy = match transport::sms_proxy(&conn, &device.id).await {
                Ok(p) => p,
                Err(e) => {
                    attempt += 1;
                    self.errors.fetch_add(1, Ordering::SeqCst);
                    self.reconnect_attempts.store(attempt, Ordering::SeqCst);
                    self.bus.publish(SyncEvent::Error(e.to_string()));
                    if !policy.within_budget(attempt) {
                        self.state.transition(SyncState::Stopped);
                        self.bus.publish(SyncEvent::Disconnected { info: Some("max attempts exceeded".to_string()) });
                        return;
                    }
                    self.state.transition(SyncState::Reconnecting);
                    self.bus.publish(SyncEvent::Reconnecting { attempt });
                    sleep(policy.delay_for_attempt(attempt)).await;
                    continue;
                }
            };

            self.state.transition(SyncState::PrimaryLive);
            self.bus.publish(SyncEvent::Connected { mode: "monitoring".to_string(), device: Some(device.name.clone()) });
            attempt = 0;
            self.reconnect_attempts.store(0, Ordering::SeqCst);

            let poll_interval = Duration::from_secs(self.config.poll_interval_secs);
            let mut fallback_tick = tokio::time::interval(poll_interval);
            let mut updates = match transport::conversation_updates(&proxy).await {
                Ok(s) => Box::pin(s),
                Err(e) => {
                    warn!(error = %e, "sms: failed to subscribe to conversationUpdated, polling only");
                    Box::pin(futures_util::stream::empty())
                }
            };

            loop {
                if !self.running.load(Ordering::SeqCst) {
                    return;
                }
                tokio::select! {
                    maybe_msg = updates.next() => {
                        match maybe_msg {
                            Some(msg) => self.ingest(&account_id, &msg).await,
                            None => break, // signal stream ended, reconnect
                        }
                    }
                    _ = fallback_tick.tick() => {
                        if let Err(e) = transport::request_all_conversations(&proxy).await {
                            warn!(error = %e, "sms: fallback conversation refresh failed");
                        }
                    }
                }
            }
        }
    }

    /// Explicit bulk backfill of existing conversations (spec §4.7
    /// "Historic import"), independent of the live `start()`/`stop()`
    /// loop. Each message is committed before the next begins, so the
    /// run can be interrupted between conversations without losing
    /// progress. Progress is reported both via the returned totals and
    /// as `SyncEvent::Sync` events on this service's bus.
    pub async fn historic_import(&self, filter: HistoricImportFilter) -> scribe_sync::Result<HistoricImportStats> {
        let conn = Connection::session().await.map_err(SmsError::from).map_err(SyncError::from)?;
        let device = transport::find_sms_device(&conn).await.map_err(SyncError::from)?;
        let account_id = ids::account_id_sms(&device.id);
        let proxy = transport::sms_proxy(&conn, &device.id).await.map_err(SyncError::from)?;
        let timeout = Duration::from_secs(self.config.message_timeout_secs);

        let updates = transport::conversation_updates(&proxy).await.map_err(SyncError::from)?;
        futures_util::pin_mut!(updates);

        let mut stats = HistoricImportStats::default();
        let mut seen_threads = std::collections::HashSet::new();

        match &filter.thread_ids {
            Some(thread_ids) => {
                for thread_id in thread_ids {
                    if let Err(e) = transport::request_conversation(&proxy, thread_id, filter.since.unwrap_or(0)).await {
                        stats.errors += 1;
                        warn!(error = %e, thread_id, "sms: historic import failed to request conversation");
                        continue;
                    }
                    self.drain_historic_updates(&mut updates, &filter, &account_id, timeout, &mut stats, &mut seen_threads).await;
                    if seen_threads.insert(thread_id.clone()) {
                        stats.conversations += 1;
                    }
                    self.bus.publish(SyncEvent::Sync { count: stats.messages, mode: "importing".to_string(), account: Some(account_id.clone()) });
                }
            }
            None => {
                if let Err(e) = transport::request_all_conversations(&proxy).await {
                    stats.errors += 1;
                    warn!(error = %e, "sms: historic import failed to request all conversations");
                    return Ok(stats);
                }
                self.drain_historic_updates(&mut updates, &filter, &account_id, timeout, &mut stats, &mut seen_threads).await;
                self.bus.publish(SyncEvent::Sync { count: stats.messages, mode: "importing".to_string(), account: Some(account_id.clone()) });
            }
        }

        Ok(stats)
    }

    /// Drain `conversationUpdated` signals until `timeout` passes with no
    /// new message, ingesting each one in range.
    async fn drain_historic_updates(
        &self,
        updates: &mut (impl futures_util::Stream<Item = BridgeMessage> + Unpin),
        filter: &HistoricImportFilter,
        account_id: &str,
        timeout: Duration,
        stats: &mut HistoricImportStats,
        seen_threads: &mut std::collections::HashSet<String>,
    ) {
        loop {
            match tokio::time::timeout(timeout, updates.next()).await {
                Ok(Some(msg)) => {
                    if !in_range(filter, msg.date) {
                        continue;
                    }
                    if seen_threads.insert(msg.thread_id.clone()) {
                        stats.conversations += 1;
                    }
                    self.ingest(account_id, &msg).await;
                    stats.messages += 1;
                }
                _ => break, // timed out or the signal stream ended
            }
        }
    }
}

#[async_trait]
impl SyncService for SmsSyncService {
    fn name(&self) -> &str {
        "sms"
    }

    async fn start(&self) -> scribe_sync::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(()); // idempotent: already running
        }
        *self.started_at.lock().await = Some(Utc::now());
        self.state.transition(SyncState::Connecting);

        let conn = Connection::session().await.map_err(SmsError::from).map_err(SyncError::from)?;
        let device = transport::find_sms_device(&conn).await.map_err(SyncError::from)?;
        info!(device = %device.name, "sms: bridge device selected");

        let this = self.clone_shared();
        let handle = tokio::spawn(async move { this.run(conn, device).await });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> scribe_sync::Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        self.state.transition(SyncState::Stopped);
        self.bus.publish(SyncEvent::Disconnected { info: None });
        Ok(())
    }

    fn get_stats(&self) -> SyncStats {
        SyncStats {
            mode: mode_label(self.state.get()),
            messages_processed: self.messages_processed.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            started_at: self.started_at.try_lock().ok().and_then(|g| *g),
            last_sync: self.last_sync.try_lock().ok().and_then(|g| *g),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::SeqCst),
            extra: Default::default(),
        }
    }

    fn events(&self) -> EventBus {
        self.bus.clone()
    }
}

/// Map the uniform lifecycle state onto the bridge's own vocabulary
/// (spec §4.7): `"monitoring"` while subscribed to `conversationUpdated`,
/// `"connecting"` while the initial D-Bus handshake is in flight.
fn mode_label(state: SyncState) -> &'static str {
    match state {
        SyncState::Stopped => "stopped",
        SyncState::Connecting => "connecting",
        SyncState::PrimaryLive => "monitoring",
        SyncState::FallbackLive => "monitoring",
        SyncState::Reconnecting => "reconnecting",
    }
}

impl SmsSyncService {
    fn clone_shared(&self) -> Arc<Self> {
        Arc::new(Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            bus: self.bus.clone(),
            state: Arc::clone(&self.state),
            messages_processed: Arc::clone(&self.messages_processed),
            errors: Arc::clone(&self.errors),
            reconnect_attempts: Arc::clone(&self.reconnect_attempts),
            started_at: Arc::clone(&self.started_at),
            last_sync: Arc::clone(&self.last_sync),
            seen: Arc::clone(&self.seen),
            running: Arc::clone(&self.running),
            task: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_label_reports_monitoring_while_live() {
        assert_eq!(mode_label(SyncState::PrimaryLive), "monitoring");
        assert_eq!(mode_label(SyncState::Stopped), "stopped");
        assert_eq!(mode_label(SyncState::Connecting), "connecting");
    }

    #[test]
    fn in_range_respects_since_and_until_bounds() {
        let filter = HistoricImportFilter { since: Some(100), until: Some(200), thread_ids: None };
        assert!(!in_range(&filter, 50));
        assert!(in_range(&filter, 150));
        assert!(!in_range(&filter, 250));
    }

    #[test]
    fn in_range_is_unbounded_when_filter_empty() {
        let filter = HistoricImportFilter::default();
        assert!(in_range(&filter, i64::MIN));
        assert!(in_range(&filter, i64::MAX));
    }
}
