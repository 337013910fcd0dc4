//! Thin WebSocket transport for the web-protocol library's event
//! stream (spec §4.7). The library's own session handshake and Noise
//! encryption live behind this socket and are not reimplemented here;
//! we only frame/parse its newline-delimited JSON events.

use futures_util::StreamExt;
use scribe_core::config::WhatsAppConfig;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::{Result, WhatsAppError};
use crate::protocol::LibraryEvent;

const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8765/whatsapp";

/// The endpoint the library's local bridge process listens on.
/// Configurable via `whatsapp.extra.ws_url`; `session_path` is passed
/// through as a query parameter so the bridge loads the right session.
pub fn ws_url(config: &WhatsAppConfig) -> String {
    let base = config
        .extra
        .get("ws_url")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_WS_URL);
    format!("{base}?session={}", urlencode(&config.session_path))
}

fn urlencode(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/') { c.to_string() } else { format!("%{:02X}", c as u32) })
        .collect()
}

pub struct WhatsAppSocket {
    stream: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
}

impl WhatsAppSocket {
    pub async fn connect(config: &WhatsAppConfig) -> Result<Self> {
        if !std::path::Path::new(&config.session_path).exists() {
            return Err(WhatsAppError::MissingSession(config.session_path.clone()));
        }
        let (stream, _resp) = tokio_tungstenite::connect_async(ws_url(config)).await?;
        Ok(Self { stream })
    }

    /// Read the next event off the socket, tolerating and skipping
    /// malformed frames (spec §7 ParseError: "logged with a warning;
    /// the record is skipped; processing continues").
    pub async fn next_event(&mut self) -> Option<LibraryEvent> {
        loop {
            let frame = self.stream.next().await?;
            let Ok(WsMessage::Text(text)) = frame else {
                continue;
            };
            match serde_json::from_str::<LibraryEvent>(&text) {
                Ok(event) => return Some(event),
                Err(e) => {
                    tracing::warn!(error = %e, "whatsapp: malformed event frame, skipping");
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn ws_url_appends_session_query_param() {
        let config = WhatsAppConfig { session_path: "/tmp/my session".to_string(), extra: BTreeMap::new() };
        assert_eq!(ws_url(&config), "ws://127.0.0.1:8765/whatsapp?session=/tmp/my%20session");
    }

    #[test]
    fn ws_url_honors_extra_override() {
        let mut extra = BTreeMap::new();
        extra.insert("ws_url".to_string(), serde_json::json!("wss://bridge.local/events"));
        let config = WhatsAppConfig { session_path: "/tmp/s".to_string(), extra };
        assert!(ws_url(&config).starts_with("wss://bridge.local/events?session="));
    }
}
