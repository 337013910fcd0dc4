//! Parsing for `signal-cli`'s JSON envelope shape (spec §4.7).
//!
//! An envelope may carry a `dataMessage` (incoming) and/or a
//! `syncMessage.sentMessage` (outgoing from another device of the same
//! account) — both are extracted, independently, into zero, one, or two
//! [`MessageInput`]s.

use scribe_core::ids;
use scribe_core::types::{tag_keys, DIRECTION_INCOMING, DIRECTION_OUTGOING};
use scribe_core::{AuthorRef, MessageInput, MessageKind, MessageRefs, Platform, SourceRef};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SignalLine {
    pub envelope: Option<SignalEnvelope>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalEnvelope {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, rename = "sourceNumber")]
    pub source_number: Option<String>,
    #[serde(default, rename = "sourceName")]
    pub source_name: Option<String>,
    pub timestamp: i64,
    #[serde(default, rename = "dataMessage")]
    pub data_message: Option<DataMessage>,
    #[serde(default, rename = "syncMessage")]
    pub sync_message: Option<SyncMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataMessage {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "groupInfo")]
    pub group_info: Option<GroupInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncMessage {
    #[serde(default, rename = "sentMessage")]
    pub sent_message: Option<SentMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default, rename = "groupInfo")]
    pub group_info: Option<GroupInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupInfo {
    #[serde(rename = "groupId")]
    pub group_id: String,
}

/// `signal-cli` daemon/CLI output interleaves plain log lines with JSON
/// envelopes; only lines that parse as JSON objects are envelopes.
pub fn parse_line(line: &str) -> Option<SignalLine> {
    let trimmed = line.trim();
    if trimmed.is_empty() || !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Conversation key for an envelope's data message or sent message:
/// `groupInfo.groupId` for groups, else the peer phone number (spec
/// §4.7 "Conversation key = groupInfo.groupId for groups else the peer
/// phone").
fn conversation_key(group_info: Option<&GroupInfo>, peer_phone: &str) -> (String, bool) {
    match group_info {
        Some(g) => (g.group_id.clone(), true),
        None => (peer_phone.to_string(), false),
    }
}

fn thread_id_for(group_info: Option<&GroupInfo>, peer_phone: &str) -> String {
    let (key, is_group) = conversation_key(group_info, peer_phone);
    if is_group {
        ids::thread_id_signal_group(&key)
    } else {
        ids::thread_id_signal_dm(&key)
    }
}

/// Build the `MessageInput`s an envelope should produce: the incoming
/// `dataMessage`, if present, and the outgoing `syncMessage.sentMessage`,
/// if present — both independently (spec §4.7).
pub fn to_message_inputs(account_id: &str, self_phone: &str, envelope: &SignalEnvelope) -> Vec<MessageInput> {
    let mut out = Vec::with_capacity(2);
    let source_phone =
        envelope.source_number.clone().or_else(|| envelope.source.clone()).unwrap_or_default();

    if let Some(data) = &envelope.data_message {
        if let Some(text) = data.message.as_deref().filter(|t| !t.is_empty()) {
            let thread_id = thread_id_for(data.group_info.as_ref(), &source_phone);
            out.push(MessageInput {
                kind: MessageKind::Signal,
                account_id: account_id.to_string(),
                author: AuthorRef {
                    name: envelope.source_name.clone(),
                    handle: Some(source_phone.clone()),
                    did: None,
                },
                created_at: envelope.timestamp,
                content: text.to_string(),
                title: None,
                visibility: None,
                refs: MessageRefs { thread_id: Some(thread_id), ..Default::default() },
                source: SourceRef { platform: Platform::Signal, platform_id: Some(envelope.timestamp.to_string()), ..Default::default() },
                tags: vec![
                    (tag_keys::DIRECTION.to_string(), DIRECTION_INCOMING.to_string()),
                    (tag_keys::PHONE_NUMBER.to_string(), source_phone.clone()),
                ],
            });
        }
    }

    if let Some(sync) = &envelope.sync_message {
        if let Some(sent) = &sync.sent_message {
            if let Some(text) = sent.message.as_deref().filter(|t| !t.is_empty()) {
                let peer = sent.destination.clone().unwrap_or_else(|| self_phone.to_string());
                let thread_id = thread_id_for(sent.group_info.as_ref(), &peer);
                out.push(MessageInput {
                    kind: MessageKind::Signal,
                    account_id: account_id.to_string(),
                    author: AuthorRef { name: Some("Me".to_string()), handle: Some(self_phone.to_string()), did: None },
                    created_at: envelope.timestamp,
                    content: text.to_string(),
                    title: None,
                    visibility: None,
                    refs: MessageRefs { thread_id: Some(thread_id), ..Default::default() },
                    source: SourceRef {
                        platform: Platform::Signal,
                        platform_id: Some(format!("{}-sync", envelope.timestamp)),
                        ..Default::default()
                    },
                    tags: vec![(tag_keys::DIRECTION.to_string(), DIRECTION_OUTGOING.to_string())],
                });
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_ignores_log_prefixes() {
        assert!(parse_line("INFO  Connected to signal-cli daemon").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn parse_line_accepts_json_envelope() {
        let line = r#"{"envelope":{"source":"+15551234567","timestamp":1700000000000,"dataMessage":{"message":"hi"}}}"#;
        let parsed = parse_line(line).unwrap();
        assert!(parsed.envelope.is_some());
    }

    #[test]
    fn incoming_dm_produces_one_input_with_dm_thread() {
        let envelope = SignalEnvelope {
            source: Some("+15551234567".to_string()),
            source_number: Some("+15551234567".to_string()),
            source_name: Some("Alice".to_string()),
            timestamp: 1_700_000_000_000,
            data_message: Some(DataMessage { message: Some("hi".to_string()), group_info: None }),
            sync_message: None,
        };
        let inputs = to_message_inputs("signal_me", "+15559999999", &envelope);
        assert_eq!(inputs.len(), 1);
        assert!(inputs[0].refs.thread_id.as_deref().unwrap().starts_with("signal_dm_"));
        assert_eq!(inputs[0].tags.iter().find(|(k, _)| k == "direction").map(|(_, v)| v.as_str()), Some(DIRECTION_INCOMING));
    }

    #[test]
    fn group_message_produces_group_thread() {
        let envelope = SignalEnvelope {
            source: Some("+15551234567".to_string()),
            source_number: Some("+15551234567".to_string()),
            source_name: None,
            timestamp: 1,
            data_message: Some(DataMessage {
                message: Some("hello group".to_string()),
                group_info: Some(GroupInfo { group_id: "abc=".to_string() }),
            }),
            sync_message: None,
        };
        let inputs = to_message_inputs("signal_me", "+1", &envelope);
        assert!(inputs[0].refs.thread_id.as_deref().unwrap().starts_with("signal_group_"));
    }

    #[test]
    fn sync_sent_message_is_extracted_as_outgoing() {
        let envelope = SignalEnvelope {
            source: Some("+15559999999".to_string()),
            source_number: None,
            source_name: None,
            timestamp: 2,
            data_message: None,
            sync_message: Some(SyncMessage {
                sent_message: Some(SentMessage {
                    message: Some("sent from another device".to_string()),
                    destination: Some("+15551234567".to_string()),
                    group_info: None,
                }),
            }),
        };
        let inputs = to_message_inputs("signal_me", "+15559999999", &envelope);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].tags.iter().find(|(k, _)| k == "direction").map(|(_, v)| v.as_str()), Some(DIRECTION_OUTGOING));
    }

    #[test]
    fn envelope_with_both_data_and_sync_yields_two_inputs() {
        let envelope = SignalEnvelope {
            source: Some("+15551234567".to_string()),
            source_number: Some("+15551234567".to_string()),
            source_name: None,
            timestamp: 3,
            data_message: Some(DataMessage { message: Some("incoming".to_string()), group_info: None }),
            sync_message: Some(SyncMessage {
                sent_message: Some(SentMessage {
                    message: Some("outgoing".to_string()),
                    destination: Some("+15550000000".to_string()),
                    group_info: None,
                }),
            }),
        };
        let inputs = to_message_inputs("signal_me", "+1", &envelope);
        assert_eq!(inputs.len(), 2);
    }

    #[test]
    fn empty_message_text_is_dropped() {
        let envelope = SignalEnvelope {
            source: Some("+1".to_string()),
            source_number: None,
            source_name: None,
            timestamp: 1,
            data_message: Some(DataMessage { message: Some(String::new()), group_info: None }),
            sync_message: None,
        };
        assert!(to_message_inputs("signal_me", "+1", &envelope).is_empty());
    }
}
