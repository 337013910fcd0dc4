//! Pure header/body translation from a raw RFC 5322 message to a
//! [`MessageInput`] (spec §4.7).

use mail_parser::{Address, MessageParser};
use scribe_core::ids;
use scribe_core::types::{tag_keys, DIRECTION_INCOMING, DIRECTION_OUTGOING, MAX_CONTENT_CHARS};
use scribe_core::{AuthorRef, MessageInput, MessageKind, MessageRefs, Platform, SourceRef};

/// Strip HTML tags down to their text content. Not a full HTML parser
/// — good enough for the archive's "readable fallback" requirement
/// when a message has no text/plain part.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clamp(content: String) -> String {
    if content.chars().count() <= MAX_CONTENT_CHARS {
        content
    } else {
        content.chars().take(MAX_CONTENT_CHARS).collect()
    }
}

fn first_from_address(addr: &Address) -> Option<(Option<String>, String)> {
    match addr {
        Address::List(items) => {
            let first = items.first()?;
            Some((first.name().map(str::to_string), first.address()?.to_string()))
        }
        Address::Group(groups) => {
            let first = groups.first()?.addresses.first()?;
            Some((first.name().map(str::to_string), first.address()?.to_string()))
        }
    }
}

/// Translate a raw message into a `MessageInput`, or `None` if it has
/// no usable text content (spec §4.7).
pub fn to_message_input(account_id: &str, account_address: &str, raw: &[u8]) -> Option<MessageInput> {
    let message = MessageParser::default().parse(raw)?;

    let from = message.from().and_then(first_from_address);
    let (from_name, from_address) = from.unwrap_or((None, String::new()));

    let content = message
        .body_text(0)
        .map(|s| s.into_owned())
        .or_else(|| message.body_html(0).map(|s| strip_html(&s)))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())?;

    let outgoing = from_address.eq_ignore_ascii_case(account_address);
    let message_id_header = message.message_id().unwrap_or_default();
    let created_at = message.date().map(|d| d.to_timestamp() * 1000).unwrap_or(0);

    let author = AuthorRef {
        name: from_name.or_else(|| (!from_address.is_empty()).then(|| from_address.clone())),
        handle: (!from_address.is_empty()).then_some(from_address.clone()),
        did: None,
    };

    Some(MessageInput {
        kind: MessageKind::Email,
        account_id: account_id.to_string(),
        author,
        created_at,
        content: clamp(content),
        title: message.subject().map(str::to_string),
        visibility: None,
        refs: MessageRefs { thread_id: Some(ids::thread_id_email(account_id, message_id_header)), ..Default::default() },
        source: SourceRef { platform: Platform::Email, platform_id: Some(message_id_header.to_string()), ..Default::default() },
        tags: vec![(
            tag_keys::DIRECTION.to_string(),
            if outgoing { DIRECTION_OUTGOING } else { DIRECTION_INCOMING }.to_string(),
        )],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_message(from: &str, to: &str, subject: &str, body: &str) -> Vec<u8> {
        format!(
            "From: {from}\r\nTo: {to}\r\nSubject: {subject}\r\nMessage-ID: <abc@mail>\r\nDate: Mon, 1 Jan 2024 10:00:00 +0000\r\nContent-Type: text/plain\r\n\r\n{body}\r\n"
        )
        .into_bytes()
    }

    #[test]
    fn strip_html_removes_tags_and_collapses_whitespace() {
        assert_eq!(strip_html("<p>hello   <b>world</b></p>"), "hello world");
    }

    #[test]
    fn incoming_message_is_parsed() {
        let raw = raw_message("sender@example.com", "me@example.com", "Hi", "hello there");
        let input = to_message_input("email_me_example_com", "me@example.com", &raw).unwrap();
        assert_eq!(input.content, "hello there");
        assert!(input.tags.iter().any(|(k, v)| k == "direction" && v == DIRECTION_INCOMING));
        assert_eq!(input.title.as_deref(), Some("Hi"));
    }

    #[test]
    fn outgoing_message_matches_account_address_case_insensitively() {
        let raw = raw_message("Me@Example.com", "someone@example.com", "Re: Hi", "reply text");
        let input = to_message_input("email_me_example_com", "me@example.com", &raw).unwrap();
        assert!(input.tags.iter().any(|(k, v)| k == "direction" && v == DIRECTION_OUTGOING));
    }

    #[test]
    fn message_with_no_text_is_dropped() {
        let raw = b"From: a@example.com\r\nTo: b@example.com\r\nSubject: empty\r\n\r\n".to_vec();
        assert!(to_message_input("acct", "b@example.com", &raw).is_none());
    }

    #[test]
    fn thread_id_is_account_scoped() {
        let raw = raw_message("sender@example.com", "me@example.com", "Hi", "hello there");
        let input = to_message_input("email_me_example_com", "me@example.com", &raw).unwrap();
        assert!(input.refs.thread_id.unwrap().starts_with("email_thread_"));
    }
}
