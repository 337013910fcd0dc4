//! In-process event bus each sync service publishes onto (spec §4.6,
//! §9 "abstract as the service publishes typed events on an in-process
//! bus"). Built on `tokio::sync::broadcast` so multiple subscribers
//! (the store, a future UI, tests) can observe the same stream.

use scribe_core::Message;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum SyncEvent {
    Message(Message),
    Sync { count: u64, mode: String, account: Option<String> },
    Connected { mode: String, device: Option<String> },
    Disconnected { info: Option<String> },
    Reconnecting { attempt: u32 },
    Error(String),
}

/// Wraps a `broadcast` sender. Subscribers register once via
/// [`EventBus::subscribe`] and must drop the receiver (or the service
/// must stop publishing) to fully unsubscribe — listener hygiene is the
/// caller's responsibility at `stop()` (spec §9).
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Broadcasting with no subscribers is not an
    /// error — the bus doesn't know or care whether anything is
    /// listening.
    pub fn publish(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(SyncEvent::Connected { mode: "idle".into(), device: None });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, SyncEvent::Connected { .. }));
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_block_future_publishes() {
        let bus = EventBus::new();
        {
            let _rx = bus.subscribe();
        }
        bus.publish(SyncEvent::Error("transient".into()));
    }
}
