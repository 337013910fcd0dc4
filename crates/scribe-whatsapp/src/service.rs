//! WhatsApp sync service (spec §4.7): single account via the
//! web-protocol library's WebSocket bridge, auto-reconnecting on
//! socket loss.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use scribe_core::config::WhatsAppConfig;
use scribe_core::ids;
use scribe_store::{CreateMessageOptions, MessageStore};
use scribe_sync::{EventBus, ReconnectPolicy, SyncEvent, SyncService, SyncState, SyncStateCell, SyncStats};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::protocol::{self, LibraryEvent};
use crate::transport::WhatsAppSocket;

pub struct WhatsAppSyncService {
    config: WhatsAppConfig,
    store: Arc<MessageStore>,
    bus: EventBus,
    account_id: Arc<Mutex<Option<String>>>,
    state: Arc<SyncStateCell>,
    messages_processed: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    reconnect_attempts: Arc<AtomicU32>,
    started_at: Arc<Mutex<Option<chrono::DateTime<Utc>>>>,
    last_sync: Arc<Mutex<Option<chrono::DateTime<Utc>>>>,
    seen: Arc<scribe_sync::SeenIdCache<String>>,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WhatsAppSyncService {
    pub fn new(config: &WhatsAppConfig, store: Arc<MessageStore>) -> Self {
        Self {
            config: config.clone(),
            store,
            bus: EventBus::new(),
            account_id: Arc::new(Mutex::new(None)),
            state: Arc::new(SyncStateCell::new()),
            messages_processed: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
            reconnect_attempts: Arc::new(AtomicU32::new(0)),
            started_at: Arc::new(Mutex::new(None)),
            last_sync: Arc::new(Mutex::new(None)),
            seen: Arc::new(scribe_sync::SeenIdCache::new()),
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    async fn ingest(&self, account_id: &str, msg: &protocol::LibraryMessage) {
        if self.seen.check_and_insert(msg.id.clone()) {
            return;
        }
        let Some(input) = protocol::to_message_input(account_id, msg) else {
            return; // no textual content, nothing to archive
        };
        match self.store.create_message(input, CreateMessageOptions { skip_thread_update: false }) {
            Ok(message) => {
                self.messages_processed.fetch_add(1, Ordering::SeqCst);
                *self.last_sync.lock().await = Some(Utc::now());
                self.bus.publish(SyncEvent::Message(message));
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::SeqCst);
                warn!(error = %e, "whatsapp: failed to store message");
            }
        }
    }

    async fn run(&self) {
        let policy = ReconnectPolicy::default();
        let mut attempt: u32 = 0;

        while self.running.load(Ordering::SeqCst) {
            let mut socket = match WhatsAppSocket::connect(&self.config).await {
                Ok(s) => s,
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
            attempt = 0;
            self.reconnect_attempts.store(0, Ordering::SeqCst);

            while self.running.load(Ordering::SeqCst) {
                match socket.next_event().await {
                    Some(LibraryEvent::Connected { me }) => {
                        let account_id = ids::account_id_whatsapp(me.phone.as_deref().unwrap_or(&me.jid));
                        *self.account_id.lock().await = Some(account_id);
                        self.bus.publish(SyncEvent::Connected { mode: "realtime".to_string(), device: me.display_name });
                        info!(jid = %me.jid, "whatsapp: connected");
                    }
                    Some(LibraryEvent::Message { message, is_new }) => {
                        if !is_new {
                            continue; // history replay, not a live event
                        }
                        let account_id = self.account_id.lock().await.clone();
                        let Some(account_id) = account_id else {
                            continue; // message arrived before the connected event somehow
                        };
                        self.ingest(&account_id, &message).await;
                    }
                    None => break, // socket closed, reconnect
                }
            }
        }
    }
}

#[async_trait]
impl SyncService for WhatsAppSyncService {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn start(&self) -> scribe_sync::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.started_at.lock().await = Some(Utc::now());
        self.state.transition(SyncState::Connecting);

        let this = self.clone_shared();
        let handle = tokio::spawn(async move { this.run().await });
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
        let mode = match self.state.get() {
            SyncState::PrimaryLive => "realtime",
            SyncState::Stopped => "stopped",
            SyncState::Connecting => "connecting",
            SyncState::FallbackLive => "realtime", // WhatsApp has no distinct fallback transport
            SyncState::Reconnecting => "reconnecting",
        };
        SyncStats {
            mode,
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

impl WhatsAppSyncService {
    fn clone_shared(&self) -> Arc<Self> {
        Arc::new(Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            bus: self.bus.clone(),
            account_id: Arc::clone(&self.account_id),
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
