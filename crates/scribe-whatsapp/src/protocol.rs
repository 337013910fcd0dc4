//! Pure translation from the web-protocol library's message shape to a
//! [`MessageInput`] (spec §4.7). The library itself (session handshake,
//! Noise encryption, multi-device pairing) is out of scope — this crate
//! only consumes the typed events it publishes.

use scribe_core::ids;
use scribe_core::types::{tag_keys, DIRECTION_INCOMING, DIRECTION_OUTGOING};
use scribe_core::{AuthorRef, MessageInput, MessageKind, MessageRefs, Platform, SourceRef, ThreadType};
use serde::Deserialize;

/// One incoming-or-outgoing message as surfaced by the library.
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryMessage {
    pub id: String,
    pub from_jid: String,
    pub timestamp: i64,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    pub from_me: bool,
}

/// The library's `connected` descriptor: our own identity.
#[derive(Debug, Clone, Deserialize)]
pub struct MeDescriptor {
    pub jid: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Event shapes the library publishes (spec §4.7: "connection yields a
/// 'connected' event and a `me` descriptor").
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LibraryEvent {
    Connected { me: MeDescriptor },
    Message { message: LibraryMessage, is_new: bool },
}

/// Infer chat kind from JID suffix (spec §4.7).
pub fn thread_type_for_jid(jid: &str) -> ThreadType {
    if jid.ends_with("@g.us") {
        ThreadType::Group
    } else if jid.ends_with("@broadcast") {
        ThreadType::Broadcast
    } else {
        ThreadType::Dm
    }
}

fn thread_id_for_jid(jid: &str) -> String {
    match thread_type_for_jid(jid) {
        ThreadType::Group => ids::thread_id_whatsapp_group(jid),
        ThreadType::Broadcast => ids::thread_id_whatsapp_broadcast(jid),
        _ => ids::thread_id_whatsapp_dm(jid),
    }
}

/// Translate a library message into a `MessageInput`, or `None` if
/// neither `text` nor `caption` carries any textual content (spec
/// §4.7: "messages without textual content are dropped").
pub fn to_message_input(account_id: &str, msg: &LibraryMessage) -> Option<MessageInput> {
    let content = msg.text.as_deref().filter(|s| !s.is_empty()).or(msg.caption.as_deref().filter(|s| !s.is_empty()))?;

    let author = if msg.from_me {
        AuthorRef { name: Some("Me".to_string()), handle: Some(msg.from_jid.clone()), did: None }
    } else {
        AuthorRef { name: msg.push_name.clone(), handle: Some(msg.from_jid.clone()), did: None }
    };

    Some(MessageInput {
        kind: MessageKind::WhatsApp,
        account_id: account_id.to_string(),
        author,
        created_at: msg.timestamp,
        content: content.to_string(),
        title: None,
        visibility: None,
        refs: MessageRefs { thread_id: Some(thread_id_for_jid(&msg.from_jid)), ..Default::default() },
        source: SourceRef { platform: Platform::WhatsApp, platform_id: Some(msg.id.clone()), ..Default::default() },
        tags: vec![(
            tag_keys::DIRECTION.to_string(),
            if msg.from_me { DIRECTION_OUTGOING } else { DIRECTION_INCOMING }.to_string(),
        )],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(from_me: bool, text: Option<&str>, caption: Option<&str>) -> LibraryMessage {
        LibraryMessage {
            id: "wa-1".to_string(),
            from_jid: "15551234567@s.whatsapp.net".to_string(),
            timestamp: 1_700_000_000_000,
            push_name: Some("Alice".to_string()),
            text: text.map(str::to_string),
            caption: caption.map(str::to_string),
            from_me,
        }
    }

    #[test]
    fn thread_type_inferred_from_jid_suffix() {
        assert_eq!(thread_type_for_jid("123@g.us"), ThreadType::Group);
        assert_eq!(thread_type_for_jid("123@broadcast"), ThreadType::Broadcast);
        assert_eq!(thread_type_for_jid("123@s.whatsapp.net"), ThreadType::Dm);
    }

    #[test]
    fn text_preferred_over_caption() {
        let msg = sample(false, Some("hi"), Some("caption"));
        let input = to_message_input("wa_acct", &msg).unwrap();
        assert_eq!(input.content, "hi");
    }

    #[test]
    fn caption_used_when_text_absent() {
        let msg = sample(false, None, Some("a photo"));
        let input = to_message_input("wa_acct", &msg).unwrap();
        assert_eq!(input.content, "a photo");
    }

    #[test]
    fn message_with_no_text_or_caption_is_dropped() {
        assert!(to_message_input("wa_acct", &sample(false, None, None)).is_none());
    }

    #[test]
    fn from_me_sets_outgoing_direction_and_me_author() {
        let msg = sample(true, Some("hi"), None);
        let input = to_message_input("wa_acct", &msg).unwrap();
        assert_eq!(input.author.name.as_deref(), Some("Me"));
        assert!(input.tags.iter().any(|(k, v)| k == "direction" && v == DIRECTION_OUTGOING));
    }
}
