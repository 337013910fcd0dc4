//! Email sync service (spec §4.7): one task per configured IMAP
//! account, each IDLE-preferred with UID-poll fallback, aggregated
//! behind a single [`SyncService`].

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use scribe_core::config::{EmailConfig, ImapAccountConfig, DEFAULT_IDLE_RESTART_SECS};
use scribe_core::ids;
use scribe_store::{CreateMessageOptions, MessageStore};
use scribe_sync::{EventBus, ReconnectPolicy, SyncEvent, SyncService, SyncState, SyncStateCell, SyncStats};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::parse;
use crate::transport::{self, ImapSession};

struct AccountRuntime {
    config: ImapAccountConfig,
    account_id: String,
    last_uid: AtomicU32,
    /// Drives this account's own lifecycle independently of its
    /// siblings: IDLE success keeps it `PrimaryLive`, an IDLE failure
    /// moves it to `FallbackLive` (polling) until IDLE can be
    /// re-established (spec §4.6, §4.7 Scenario C).
    state: SyncStateCell,
}

/// Per-account IDLE/polling label, derived from the account's
/// `SyncState` rather than tracked separately (spec §4.7).
fn account_mode_label(state: SyncState) -> &'static str {
    match state {
        SyncState::Stopped => "stopped",
        SyncState::Connecting => "connecting",
        SyncState::PrimaryLive => "idle",
        SyncState::FallbackLive => "polling",
        SyncState::Reconnecting => "reconnecting",
    }
}

/// Aggregate mode reported by `get_stats()`: `"polling"` if any account
/// has fallen back, else `"idle"` if any account is live, else
/// `"connecting"`/`"stopped"` (spec §4.7 Scenario C: the service-wide
/// stats must reflect an account's fallback, not just its own events).
fn aggregate_mode(running: bool, account_states: &[SyncState]) -> &'static str {
    if !running {
        return "stopped";
    }
    if account_states.iter().any(|s| *s == SyncState::FallbackLive) {
        "polling"
    } else if account_states.iter().any(|s| *s == SyncState::PrimaryLive) {
        "idle"
    } else {
        "connecting"
    }
}

pub struct EmailSyncService {
    accounts: Vec<Arc<AccountRuntime>>,
    store: Arc<MessageStore>,
    bus: EventBus,
    running: Arc<std::sync::atomic::AtomicBool>,
    messages_processed: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    reconnect_attempts: Arc<AtomicU32>,
    started_at: Arc<Mutex<Option<chrono::DateTime<Utc>>>>,
    last_sync: Arc<Mutex<Option<chrono::DateTime<Utc>>>>,
    seen: Arc<scribe_sync::SeenIdCache<String>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EmailSyncService {
    pub fn new(config: &EmailConfig, store: Arc<MessageStore>) -> Self {
        let accounts = config
            .accounts
            .iter()
            .map(|acct| {
                Arc::new(AccountRuntime {
                    config: acct.clone(),
                    account_id: ids::account_id_email(&acct.user),
                    last_uid: AtomicU32::new(0),
                    state: SyncStateCell::new(),
                })
            })
            .collect();
        Self {
            accounts,
            store,
            bus: EventBus::new(),
            running: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            messages_processed: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
            reconnect_attempts: Arc::new(AtomicU32::new(0)),
            started_at: Arc::new(Mutex::new(None)),
            last_sync: Arc::new(Mutex::new(None)),
            seen: Arc::new(scribe_sync::SeenIdCache::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    async fn ingest(&self, account: &AccountRuntime, uid: u32, raw: &[u8]) {
        let native_id = format!("{}:{}", account.config.label, uid);
        if self.seen.check_and_insert(native_id) {
            return;
        }
        let Some(input) = parse::to_message_input(&account.account_id, &account.config.user, raw) else {
            return; // no text content, nothing to archive
        };
        match self.store.create_message(input, CreateMessageOptions { skip_thread_update: false }) {
            Ok(message) => {
                self.messages_processed.fetch_add(1, Ordering::SeqCst);
                *self.last_sync.lock().await = Some(Utc::now());
                self.bus.publish(SyncEvent::Message(message));
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::SeqCst);
                warn!(error = %e, account = %account.config.label, "email: failed to store message");
            }
        }
        account.last_uid.store(uid.max(account.last_uid.load(Ordering::SeqCst)), Ordering::SeqCst);
    }

    async fn run_account(self: Arc<Self>, account: Arc<AccountRuntime>) {
        let policy = ReconnectPolicy::new(1, scribe_core::config::DEFAULT_MAX_RECONNECT_ATTEMPTS);
        let mut attempt: u32 = 0;
        account.state.transition(SyncState::Connecting);

        while self.running.load(Ordering::SeqCst) {
            let mut session = match transport::connect(&account.config).await {
                Ok(s) => s,
                Err(e) => {
                    attempt += 1;
                    self.errors.fetch_add(1, Ordering::SeqCst);
                    self.reconnect_attempts.store(attempt, Ordering::SeqCst);
                    self.bus.publish(SyncEvent::Error(e.to_string()));
                    if !policy.within_budget(attempt) {
                        account.state.transition(SyncState::Stopped);
                        self.bus.publish(SyncEvent::Disconnected { info: Some(format!("{}: max attempts exceeded", account.config.label)) });
                        return;
                    }
                    self.bus.publish(SyncEvent::Reconnecting { attempt });
                    sleep(policy.delay_for_attempt(attempt)).await;
                    continue;
                }
            };

            let high_water_mark = match transport::initial_high_water_mark(&mut session, &account.config.folder).await {
                Ok(uid) => uid,
                Err(e) => {
                    warn!(error = %e, account = %account.config.label, "email: failed to read mailbox status");
                    continue;
                }
            };
            if account.last_uid.load(Ordering::SeqCst) == 0 {
                account.last_uid.store(high_water_mark, Ordering::SeqCst);
            }
            attempt = 0;
            self.reconnect_attempts.store(0, Ordering::SeqCst);
            info!(account = %account.config.label, uid = high_water_mark, "email: connected, watching for new mail");
            account.state.transition(SyncState::PrimaryLive);
            self.bus.publish(SyncEvent::Connected { mode: account_mode_label(SyncState::PrimaryLive).to_string(), device: Some(account.config.label.clone()) });

            if let Err(e) = self.watch_account(&mut session, &account).await {
                warn!(error = %e, account = %account.config.label, "email: connection lost, reconnecting");
                self.errors.fetch_add(1, Ordering::SeqCst);
                account.state.transition(SyncState::Reconnecting);
            }
        }
    }

    /// IDLE-preferred loop with a periodic poll fallback: an IDLE
    /// timeout (or failure) falls through to a direct UID fetch so no
    /// cycle is lost (spec §4.7, §5 "push-transport restart quirk").
    /// The account's `SyncState` tracks which regime is active so
    /// `get_stats()` can report `"polling"` for the duration of the
    /// fallback, not just `"idle"`/`"stopped"` (spec §8 Scenario C).
    async fn watch_account(&self, session: &mut ImapSession, account: &Arc<AccountRuntime>) -> crate::error::Result<()> {
        let idle_timeout = Duration::from_secs(account.config.idle_restart_secs.min(DEFAULT_IDLE_RESTART_SECS));
        let poll_interval = Duration::from_secs(account.config.poll_interval_secs);

        while self.running.load(Ordering::SeqCst) {
            match transport::idle_once(session, idle_timeout).await {
                Ok(_notified) => {
                    if account.state.transition(SyncState::PrimaryLive) {
                        self.bus.publish(SyncEvent::Connected { mode: account_mode_label(SyncState::PrimaryLive).to_string(), device: Some(account.config.label.clone()) });
                    }
                    let last_uid = account.last_uid.load(Ordering::SeqCst);
                    let fetched = transport::fetch_new_since(session, last_uid).await?;
                    for (uid, raw) in fetched {
                        self.ingest(account, uid, &raw).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, account = %account.config.label, "email: idle failed, falling back to polling once");
                    if account.state.transition(SyncState::FallbackLive) {
                        self.bus.publish(SyncEvent::Connected { mode: account_mode_label(SyncState::FallbackLive).to_string(), device: Some(account.config.label.clone()) });
                    }
                    let last_uid = account.last_uid.load(Ordering::SeqCst);
                    let fetched = transport::fetch_new_since(session, last_uid).await?;
                    for (uid, raw) in fetched {
                        self.ingest(account, uid, &raw).await;
                    }
                    sleep(poll_interval).await;
                    // idle is retried next iteration; the state machine
                    // requires passing through Reconnecting before a
                    // fallback account can become primary-live again.
                    account.state.transition(SyncState::Reconnecting);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SyncService for EmailSyncService {
    fn name(&self) -> &str {
        "email"
    }

    async fn start(&self) -> scribe_sync::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.started_at.lock().await = Some(Utc::now());

        if self.accounts.is_empty() {
            warn!("email: no accounts configured, service starting idle");
        }

        let this = Arc::new(Self {
            accounts: self.accounts.clone(),
            store: Arc::clone(&self.store),
            bus: self.bus.clone(),
            running: Arc::clone(&self.running),
            messages_processed: Arc::clone(&self.messages_processed),
            errors: Arc::clone(&self.errors),
            reconnect_attempts: Arc::clone(&self.reconnect_attempts),
            started_at: Arc::clone(&self.started_at),
            last_sync: Arc::clone(&self.last_sync),
            seen: Arc::clone(&self.seen),
            tasks: Mutex::new(Vec::new()),
        });

        let mut handles = Vec::new();
        for account in this.accounts.clone() {
            let this = Arc::clone(&this);
            handles.push(tokio::spawn(async move { this.run_account(account).await }));
        }
        *self.tasks.lock().await = handles;
        Ok(())
    }

    async fn stop(&self) -> scribe_sync::Result<()> {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }
        self.bus.publish(SyncEvent::Disconnected { info: None });
        Ok(())
    }

    fn get_stats(&self) -> SyncStats {
        let states: Vec<SyncState> = self.accounts.iter().map(|a| a.state.get()).collect();
        SyncStats {
            mode: aggregate_mode(self.running.load(Ordering::SeqCst), &states),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_mode_prefers_polling_when_any_account_is_in_fallback() {
        use SyncState::*;
        assert_eq!(aggregate_mode(true, &[PrimaryLive, FallbackLive]), "polling");
        assert_eq!(aggregate_mode(true, &[PrimaryLive]), "idle");
        assert_eq!(aggregate_mode(false, &[PrimaryLive]), "stopped");
        assert_eq!(aggregate_mode(true, &[Connecting]), "connecting");
    }

    #[test]
    fn account_mode_label_matches_idle_and_polling_regimes() {
        assert_eq!(account_mode_label(SyncState::PrimaryLive), "idle");
        assert_eq!(account_mode_label(SyncState::FallbackLive), "polling");
        assert_eq!(account_mode_label(SyncState::Stopped), "stopped");
    }
}
