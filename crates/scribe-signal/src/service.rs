//! Signal sync service (spec §4.7): persistent daemon connection
//! preferred, `signal-cli receive` polling as fallback.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use scribe_core::config::{SignalConfig, DEFAULT_SIGNAL_DAEMON_STARTUP_TIMEOUT_SECS};
use scribe_core::ids;
use scribe_store::{CreateMessageOptions, MessageStore};
use scribe_sync::{EventBus, ReconnectPolicy, SyncError, SyncEvent, SyncService, SyncState, SyncStateCell, SyncStats};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::cli;
use crate::daemon::{self, DaemonHandle};
use crate::envelope;
use crate::error::SignalError;

pub struct SignalSyncService {
    config_phone: String,
    config: SignalConfig,
    store: Arc<MessageStore>,
    bus: EventBus,
    running: Arc<AtomicBool>,
    state: Arc<SyncStateCell>,
    messages_processed: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    reconnect_attempts: Arc<AtomicU32>,
    started_at: Arc<Mutex<Option<chrono::DateTime<Utc>>>>,
    last_sync: Arc<Mutex<Option<chrono::DateTime<Utc>>>>,
    seen: Arc<scribe_sync::SeenIdCache<String>>,
    task: Mutex<Option<JoinHandle<()>>>,
    daemon: Arc<Mutex<Option<DaemonHandle>>>,
}

impl SignalSyncService {
    pub fn new(config: &SignalConfig, store: Arc<MessageStore>) -> Self {
        Self {
            config_phone: config.phone.clone(),
            config: config.clone(),
            store,
            bus: EventBus::new(),
            running: Arc::new(AtomicBool::new(false)),
            state: Arc::new(SyncStateCell::new()),
            messages_processed: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
            reconnect_attempts: Arc::new(AtomicU32::new(0)),
            started_at: Arc::new(Mutex::new(None)),
            last_sync: Arc::new(Mutex::new(None)),
            seen: Arc::new(scribe_sync::SeenIdCache::new()),
            task: Mutex::new(None),
            daemon: Arc::new(Mutex::new(None)),
        }
    }

    fn account_id(&self) -> String {
        ids::account_id_signal(&self.config_phone)
    }

    async fn ingest(&self, inputs: Vec<scribe_core::MessageInput>) {
        for input in inputs {
            let native_id = format!("{}:{}", self.config_phone, input.created_at);
            if self.seen.check_and_insert(native_id) {
                continue; // already observed this native message id
            }
            match self
                .store
                .create_message(input, CreateMessageOptions { skip_thread_update: false })
            {
                Ok(message) => {
                    self.messages_processed.fetch_add(1, Ordering::SeqCst);
                    *self.last_sync.lock().await = Some(Utc::now());
                    self.bus.publish(SyncEvent::Message(message));
                }
                Err(e) => {
                    self.errors.fetch_add(1, Ordering::SeqCst);
                    warn!(error = %e, "signal: failed to store message");
                }
            }
        }
    }

    async fn run_daemon_mode(&self, handle: DaemonHandle) {
        *self.daemon.lock().await = Some(handle);
        self.state.transition(SyncState::PrimaryLive);
        self.bus.publish(SyncEvent::Connected { mode: "daemon".to_string(), device: None });
        info!(phone = %self.config_phone, "signal: daemon connected, skipping conversation preload");

        let addr = (self.config.daemon_host.as_str(), self.config.daemon_port);
        let stream = match TcpStream::connect(addr).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "signal: could not attach to daemon socket after spawn");
                return;
            }
        };
        let mut lines = BufReader::new(stream).lines();
        while self.running.load(Ordering::SeqCst) {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(parsed) = envelope::parse_line(&line) {
                        if let Some(env) = parsed.envelope {
                            let inputs = envelope::to_message_inputs(&self.account_id(), &self.config_phone, &env);
                            self.ingest(inputs).await;
                            self.reconnect_attempts.store(0, Ordering::SeqCst);
                        }
                    }
                }
                Ok(None) => break, // daemon closed the socket
                Err(e) => {
                    warn!(error = %e, "signal: daemon socket read error");
                    break;
                }
            }
        }
    }

    async fn run_polling_mode(&self) {
        self.state.transition(SyncState::FallbackLive);
        self.bus.publish(SyncEvent::Connected { mode: "cli".to_string(), device: None });
        let poll_interval = Duration::from_secs(self.config.poll_interval_secs);
        let receive_timeout = Duration::from_secs(self.config.receive_timeout_secs);
        let policy = ReconnectPolicy::default();
        let mut attempt: u32 = 0;

        while self.running.load(Ordering::SeqCst) {
            match cli::receive_once(&self.config.cli_path, &self.config_phone, receive_timeout).await {
                Ok(envelopes) => {
                    self.state.transition(SyncState::FallbackLive); // no-op once already here; legal from Reconnecting
                    attempt = 0;
                    self.reconnect_attempts.store(0, Ordering::SeqCst);
                    for env in envelopes {
                        let inputs = envelope::to_message_inputs(&self.account_id(), &self.config_phone, &env);
                        self.ingest(inputs).await;
                    }
                }
                Err(e) => {
                    attempt += 1;
                    self.errors.fetch_add(1, Ordering::SeqCst);
                    self.reconnect_attempts.store(attempt, Ordering::SeqCst);
                    self.bus.publish(SyncEvent::Error(e.to_string()));
                    if !policy.within_budget(attempt) {
                        warn!("signal: CLI polling exceeded max reconnect attempts, stopping service");
                        self.state.transition(SyncState::Stopped);
                        self.bus.publish(SyncEvent::Disconnected { info: Some("max attempts exceeded".to_string()) });
                        return;
                    }
                    self.state.transition(SyncState::Reconnecting);
                    self.bus.publish(SyncEvent::Reconnecting { attempt });
                    sleep(policy.delay_for_attempt(attempt)).await;
                    continue;
                }
            }
            sleep(poll_interval).await;
        }
    }
}

#[async_trait]
impl SyncService for SignalSyncService {
    fn name(&self) -> &str {
        "signal"
    }

    async fn start(&self) -> scribe_sync::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(()); // idempotent: already running
        }
        if self.config_phone.is_empty() {
            self.running.store(false, Ordering::SeqCst);
            return Err(SyncError::from(SignalError::MissingPhone));
        }
        *self.started_at.lock().await = Some(Utc::now());
        self.state.transition(SyncState::Connecting);

        let already_running = daemon::is_daemon_running(&self.config.daemon_host, self.config.daemon_port).await;
        let use_daemon = self.config.prefer_daemon && (already_running || self.config.auto_start_daemon);

        let daemon_handle = if use_daemon && !already_running {
            let timeout = Duration::from_secs(DEFAULT_SIGNAL_DAEMON_STARTUP_TIMEOUT_SECS);
            match daemon::spawn_daemon(&self.config.cli_path, &self.config_phone, timeout).await {
                Ok(h) => Some(h),
                Err(e) => {
                    warn!(error = %e, "signal: daemon autostart failed, falling back to CLI polling");
                    None
                }
            }
        } else if use_daemon {
            Some(DaemonHandle::external())
        } else {
            None
        };

        let this = self.clone_shared();
        let handle = tokio::spawn(async move {
            if let Some(daemon_handle) = daemon_handle {
                this.run_daemon_mode(daemon_handle).await;
                if this.running.load(Ordering::SeqCst) {
                    this.run_polling_mode().await;
                }
            } else {
                this.run_polling_mode().await;
            }
        });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> scribe_sync::Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        if let Some(daemon_handle) = self.daemon.lock().await.take() {
            daemon_handle.stop(self.config.keep_daemon).await;
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

/// Map the uniform lifecycle state onto signal's own transport
/// vocabulary (spec §4.7: `"daemon"` for the persistent socket,
/// `"cli"` for `signal-cli receive` polling).
fn mode_label(state: SyncState) -> &'static str {
    match state {
        SyncState::Stopped => "stopped",
        SyncState::Connecting => "connecting",
        SyncState::PrimaryLive => "daemon",
        SyncState::FallbackLive => "cli",
        SyncState::Reconnecting => "reconnecting",
    }
}

impl SignalSyncService {
    /// Cheap clone of the `Arc`-backed shared fields, used to move a
    /// handle into the background task spawned by `start()`.
    fn clone_shared(&self) -> Arc<Self> {
        Arc::new(Self {
            config_phone: self.config_phone.clone(),
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            bus: self.bus.clone(),
            running: Arc::clone(&self.running),
            state: Arc::clone(&self.state),
            messages_processed: Arc::clone(&self.messages_processed),
            errors: Arc::clone(&self.errors),
            reconnect_attempts: Arc::clone(&self.reconnect_attempts),
            started_at: Arc::clone(&self.started_at),
            last_sync: Arc::clone(&self.last_sync),
            seen: Arc::clone(&self.seen),
            task: Mutex::new(None),
            daemon: Arc::clone(&self.daemon),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_label_matches_daemon_and_cli_transports() {
        assert_eq!(mode_label(SyncState::PrimaryLive), "daemon");
        assert_eq!(mode_label(SyncState::FallbackLive), "cli");
        assert_eq!(mode_label(SyncState::Stopped), "stopped");
    }
}
