//! Pure translation from a mobile-bridge conversation message to a
//! [`MessageInput`] (spec §4.7).

use scribe_core::ids;
use scribe_core::types::{tag_keys, DIRECTION_INCOMING, DIRECTION_OUTGOING};
use scribe_core::{AuthorRef, MessageInput, MessageKind, MessageRefs, Platform, SourceRef};
use serde::Deserialize;

/// `type` field as surfaced by the bridge: 2 means outgoing, anything
/// else is treated as incoming (spec §4.7).
pub const OUTGOING_TYPE: i32 = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeMessage {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: String,
    pub address: String,
    pub body: String,
    pub date: i64,
    #[serde(rename = "type")]
    pub kind: i32,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
}

pub fn is_outgoing(kind: i32) -> bool {
    kind == OUTGOING_TYPE
}

/// Compose a display name from contact parts. Preserved from the source
/// system as-is (spec §9 open question): if the family name is missing
/// the given name is used alone, even if the given name is also absent
/// — this can yield an empty display name for a partially-resolved
/// contact. Not fixed here; a higher layer may choose to patch it.
pub fn compose_display_name(given: Option<&str>, family: Option<&str>) -> String {
    match (given, family) {
        (Some(g), Some(f)) => format!("{g} {f}"),
        (Some(g), None) => g.to_string(),
        (None, Some(f)) => f.to_string(),
        (None, None) => String::new(),
    }
}

/// Cosmetic phone-number formatting for incoming-message author display
/// (spec §4.7 "Author display is a formatted phone number for
/// incoming"). Only reformats plausible 10/11-digit NANP numbers;
/// anything else passes through unchanged.
pub fn format_phone_number(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let local = match digits.len() {
        10 => &digits[..],
        11 if digits.starts_with('1') => &digits[1..],
        _ => return raw.to_string(),
    };
    format!("({}) {}-{}", &local[0..3], &local[3..6], &local[6..10])
}

/// Translate one bridge message into a `MessageInput`, or `None` if its
/// body is empty (attachment-only messages contribute nothing to the
/// archive — spec §9).
pub fn to_message_input(account_id: &str, msg: &BridgeMessage) -> Option<MessageInput> {
    if msg.body.is_empty() {
        return None;
    }

    let outgoing = is_outgoing(msg.kind);
    let author = if outgoing {
        AuthorRef { name: Some("Me".to_string()), handle: Some(msg.address.clone()), did: None }
    } else {
        let display = compose_display_name(msg.given_name.as_deref(), msg.family_name.as_deref());
        let name = if display.is_empty() { format_phone_number(&msg.address) } else { display };
        AuthorRef { name: Some(name), handle: Some(msg.address.clone()), did: None }
    };

    Some(MessageInput {
        kind: MessageKind::Sms,
        account_id: account_id.to_string(),
        author,
        created_at: msg.date,
        content: msg.body.clone(),
        title: None,
        visibility: None,
        refs: MessageRefs { thread_id: Some(ids::thread_id_sms_dm(&msg.address)), ..Default::default() },
        source: SourceRef { platform: Platform::Sms, platform_id: Some(msg.id.clone()), ..Default::default() },
        tags: vec![
            (
                tag_keys::DIRECTION.to_string(),
                if outgoing { DIRECTION_OUTGOING } else { DIRECTION_INCOMING }.to_string(),
            ),
            (tag_keys::PHONE_NUMBER.to_string(), msg.address.clone()),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: i32, body: &str) -> BridgeMessage {
        BridgeMessage {
            id: "native-1".to_string(),
            thread_id: "t1".to_string(),
            address: "+15551234567".to_string(),
            body: body.to_string(),
            date: 1_700_000_000_000,
            kind,
            given_name: Some("Alice".to_string()),
            family_name: None,
        }
    }

    #[test]
    fn outgoing_type_two_is_recognized() {
        assert!(is_outgoing(OUTGOING_TYPE));
        assert!(!is_outgoing(1));
    }

    #[test]
    fn compose_display_name_uses_given_only_when_family_missing() {
        assert_eq!(compose_display_name(Some("Alice"), None), "Alice");
        assert_eq!(compose_display_name(Some("Alice"), Some("Smith")), "Alice Smith");
        assert_eq!(compose_display_name(None, None), "");
    }

    #[test]
    fn format_phone_number_formats_ten_digit_nanp() {
        assert_eq!(format_phone_number("5551234567"), "(555) 123-4567");
        assert_eq!(format_phone_number("+15551234567"), "(555) 123-4567");
        assert_eq!(format_phone_number("not-a-number"), "not-a-number");
    }

    #[test]
    fn outgoing_message_author_is_me() {
        let msg = sample(OUTGOING_TYPE, "hi");
        let input = to_message_input("sms_acct", &msg).unwrap();
        assert_eq!(input.author.name.as_deref(), Some("Me"));
        assert!(input.tags.iter().any(|(k, v)| k == "direction" && v == DIRECTION_OUTGOING));
    }

    #[test]
    fn incoming_message_uses_contact_name() {
        let msg = sample(1, "hey there");
        let input = to_message_input("sms_acct", &msg).unwrap();
        assert_eq!(input.author.name.as_deref(), Some("Alice"));
        assert!(input.tags.iter().any(|(k, v)| k == "direction" && v == DIRECTION_INCOMING));
    }

    #[test]
    fn empty_body_is_dropped() {
        assert!(to_message_input("sms_acct", &sample(1, "")).is_none());
    }
}
