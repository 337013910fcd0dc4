use std::sync::Arc;

use scribe_core::config::ScribeConfig;
use scribe_store::MessageStore;
use scribe_sync::SyncRegistry;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "scribe_engine=info,scribe_sync=info".into()),
        )
        .init();

    let config_path = std::env::var("SCRIBE_CONFIG").ok();
    let config = ScribeConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({}), using defaults", e);
        ScribeConfig::default()
    });

    let store = Arc::new(MessageStore::new(&config.store.base_path)?);
    info!(path = %config.store.base_path, "message store ready");

    let registry = build_registry(&config, Arc::clone(&store));
    registry.start_all().await;
    info!(services = ?registry.names(), "sync services started");

    shutdown_signal().await;
    info!("shutting down");
    registry.stop_all().await;

    Ok(())
}

/// Construct and register every sync service with a present config
/// section (spec §6: each platform's section is optional; omission
/// just means that service never registers).
fn build_registry(config: &ScribeConfig, store: Arc<MessageStore>) -> SyncRegistry {
    let mut registry = SyncRegistry::new();

    registry.register(Arc::new(scribe_email::EmailSyncService::new(&config.email, Arc::clone(&store))));

    if let Some(sms) = &config.sms {
        registry.register(Arc::new(scribe_sms::SmsSyncService::new(sms, Arc::clone(&store))));
    }
    if let Some(signal) = &config.signal {
        registry.register(Arc::new(scribe_signal::SignalSyncService::new(signal, Arc::clone(&store))));
    }
    if let Some(whatsapp) = &config.whatsapp {
        registry.register(Arc::new(scribe_whatsapp::WhatsAppSyncService::new(whatsapp, Arc::clone(&store))));
    }
    if let Some(discord) = &config.discord {
        registry.register(Arc::new(scribe_discord::DiscordSyncService::new(discord, Arc::clone(&store))));
    }

    registry
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
