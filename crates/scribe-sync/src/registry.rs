//! Explicit registry of sync-service instances (spec §9: "the source
//! uses process-global singletons for each sync service... model this
//! as an explicit registry owned by the top-level process; pass the
//! registry as a dependency rather than reaching for ambient state").
//!
//! Mirrors the teacher's `ChannelManager`, generalized from a
//! send/receive channel abstraction to the ingestion engine's
//! long-lived sync-service lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::service::{SyncService, SyncStats};

/// Owns every registered per-platform sync service. The top-level
/// binary builds one `SyncRegistry`, registers the services implied by
/// its loaded config, and drives them for the process lifetime.
#[derive(Default)]
pub struct SyncRegistry {
    services: HashMap<String, Arc<dyn SyncService>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self { services: HashMap::new() }
    }

    /// Register a service adapter. Replaces any prior registration under
    /// the same name.
    pub fn register(&mut self, service: Arc<dyn SyncService>) {
        let name = service.name().to_string();
        info!(service = %name, "registering sync service");
        self.services.insert(name, service);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SyncService>> {
        self.services.get(name).cloned()
    }

    /// Start every registered service. One service's start failure
    /// (`ConfigError` at startup — spec §7) is logged and does not
    /// prevent the others from starting (spec §7 "if one sync service
    /// fails to start, others keep running").
    pub async fn start_all(&self) {
        for (name, service) in &self.services {
            info!(service = %name, "starting sync service");
            if let Err(e) = service.start().await {
                error!(service = %name, error = %e, "sync service failed to start");
            }
        }
    }

    /// Stop every registered service. Errors are logged but do not abort
    /// stopping the remaining services.
    pub async fn stop_all(&self) {
        for (name, service) in &self.services {
            info!(service = %name, "stopping sync service");
            if let Err(e) = service.stop().await {
                warn!(service = %name, error = %e, "error while stopping sync service");
            }
        }
    }

    /// Current stats for every registered service, sorted by name for
    /// deterministic output.
    pub fn all_stats(&self) -> Vec<(String, SyncStats)> {
        let mut out: Vec<(String, SyncStats)> =
            self.services.iter().map(|(name, s)| (name.clone(), s.get_stats())).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct StubService {
        label: &'static str,
        started: AtomicU64,
        bus: EventBus,
    }

    #[async_trait]
    impl SyncService for StubService {
        fn name(&self) -> &str {
            self.label
        }
        async fn start(&self) -> crate::Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn stop(&self) -> crate::Result<()> {
            Ok(())
        }
        fn get_stats(&self) -> SyncStats {
            SyncStats::stopped()
        }
        fn events(&self) -> EventBus {
            self.bus.clone()
        }
    }

    #[tokio::test]
    async fn start_all_drives_every_registered_service() {
        let mut registry = SyncRegistry::new();
        registry.register(Arc::new(StubService { label: "signal", started: AtomicU64::new(0), bus: EventBus::new() }));
        registry.register(Arc::new(StubService { label: "email", started: AtomicU64::new(0), bus: EventBus::new() }));

        registry.start_all().await;
        assert_eq!(registry.names(), vec!["email".to_string(), "signal".to_string()]);
        assert_eq!(registry.all_stats().len(), 2);
    }
}
