//! D-Bus transport for the mobile SMS bridge (spec §4.7).
//!
//! Modeled on KDE Connect's real `org.kde.kdeconnect` session-bus
//! surface: a device object exposes `org.kde.kdeconnect.device.sms`
//! with a `conversationUpdated` signal (preferred, push-based) and
//! `conversationUpds`/`requestConversation` methods for enumeration and
//! fallback polling.

use futures_util::StreamExt;
use serde_json::Value;
use zbus::{dbus_proxy, Connection};

use crate::error::{Result, SmsError};
use crate::parse::BridgeMessage;

const DAEMON_BUS_NAME: &str = "org.kde.kdeconnect";
const DAEMON_PATH: &str = "/modules/kdeconnect";

#[dbus_proxy(
    interface = "org.kde.kdeconnect.daemon",
    default_service = "org.kde.kdeconnect",
    default_path = "/modules/kdeconnect"
)]
trait KdeConnectDaemon {
    fn devices(&self, only_reachable: bool, only_paired: bool) -> zbus::Result<Vec<String>>;
    fn device_name(&self, device_id: &str) -> zbus::Result<String>;
    fn has_plugin(&self, device_id: &str, plugin: &str) -> zbus::Result<bool>;
}

#[dbus_proxy(
    interface = "org.kde.kdeconnect.device.sms",
    default_service = "org.kde.kdeconnect"
)]
trait KdeConnectSms {
    /// Emitted whenever a conversation gains a new message. The bridge
    /// hands us a JSON blob rather than a strongly-typed struct; we
    /// parse it ourselves.
    #[dbus_proxy(signal)]
    fn conversation_updated(&self, thread_id: String, data: String) -> zbus::Result<()>;

    fn request_conversation(&self, thread_id: &str, range_start_timestamp: i64) -> zbus::Result<()>;
    fn request_all_conversations(&self) -> zbus::Result<()>;
}

/// A paired, SMS-capable device selected for this session.
pub struct SmsDevice {
    pub id: String,
    pub name: String,
}

/// Enumerate paired, reachable devices and pick the first one exposing
/// the `sms` plugin. Failure to locate one is fatal at `start()` (spec
/// §4.7).
pub async fn find_sms_device(conn: &Connection) -> Result<SmsDevice> {
    let daemon = KdeConnectDaemonProxy::builder(conn)
        .destination(DAEMON_BUS_NAME)?
        .path(DAEMON_PATH)?
        .build()
        .await?;

    let device_ids = daemon.devices(true, true).await?;
    for id in device_ids {
        if daemon.has_plugin(&id, "kdeconnect_sms").await.unwrap_or(false) {
            let name = daemon.device_name(&id).await.unwrap_or_else(|_| id.clone());
            return Ok(SmsDevice { id, name });
        }
    }
    Err(SmsError::NoDevice)
}

fn device_object_path(device_id: &str) -> String {
    format!("/modules/kdeconnect/devices/{device_id}/sms")
}

pub async fn sms_proxy<'a>(conn: &Connection, device_id: &str) -> Result<KdeConnectSmsProxy<'a>> {
    let proxy = KdeConnectSmsProxy::builder(conn)
        .destination(DAEMON_BUS_NAME)?
        .path(device_object_path(device_id))?
        .build()
        .await?;
    Ok(proxy)
}

/// Subscribe to `conversationUpdated` and decode each signal's JSON
/// payload into zero or more [`BridgeMessage`]s (a payload may carry a
/// single message or a short backlog batch).
pub async fn conversation_updates(proxy: &KdeConnectSmsProxy<'_>) -> Result<impl futures_util::Stream<Item = BridgeMessage> + '_> {
    let signals = proxy.receive_conversation_updated().await?;
    Ok(signals
        .filter_map(|signal| async move { signal.args().ok().map(|args| decode_payload(args.data())) })
        .flat_map(futures_util::stream::iter))
}

fn decode_payload(raw: &str) -> Vec<BridgeMessage> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        Ok(single) => serde_json::from_value(single).into_iter().collect(),
        Err(_) => Vec::new(),
    }
}

/// Request a full conversation refresh, used by the poll-based fallback
/// when the device doesn't (or can no longer) push signals.
pub async fn request_all_conversations(proxy: &KdeConnectSmsProxy<'_>) -> Result<()> {
    proxy.request_all_conversations().await?;
    Ok(())
}

/// Request the backlog of a single conversation starting at
/// `range_start_timestamp` (ms since epoch, 0 for "from the
/// beginning"). Used by historic import to scope a backfill to
/// specific threads (spec §4.7 "Historic import").
pub async fn request_conversation(proxy: &KdeConnectSmsProxy<'_>, thread_id: &str, range_start_timestamp: i64) -> Result<()> {
    proxy.request_conversation(thread_id, range_start_timestamp).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_payload_handles_single_object_and_array() {
        let single = r#"{"id":"1","threadId":"t","address":"+1","body":"hi","date":1,"type":1}"#;
        assert_eq!(decode_payload(single).len(), 1);

        let array = r#"[{"id":"1","threadId":"t","address":"+1","body":"hi","date":1,"type":1},
                         {"id":"2","threadId":"t","address":"+1","body":"yo","date":2,"type":2}]"#;
        assert_eq!(decode_payload(array).len(), 2);
    }

    #[test]
    fn decode_payload_tolerates_garbage() {
        assert!(decode_payload("not json").is_empty());
    }
}
