//! Uniform ID derivation scheme for accounts, threads and messages per
//! platform (spec §3, §4.8).
//!
//! Every helper here is a pure function: given the same platform inputs
//! it must always return the same ID, so that `getOrCreateAccount` /
//! `getOrCreateThread` are idempotent by construction.

use sha2::{Digest, Sha256};

use crate::types::{Platform, ThreadType};

/// Replace characters that would be awkward in a file/ID context with
/// `_`, and lowercase the result. Used for turning free-form handles
/// (email addresses, phone numbers) into ID-safe fragments.
pub fn sanitize_identifier(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// First 16 hex chars of SHA-256(parts joined by `:`) — used where a
/// conservative, opaque-but-deterministic key is needed (e.g. deriving
/// an email thread ID from a `Message-Id` header without leaking it
/// verbatim into the ID).
pub fn short_hash(parts: &[&str]) -> String {
    let joined = parts.join(":");
    let digest = Sha256::digest(joined.as_bytes());
    hex_prefix(&digest, 16)
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut s = String::with_capacity(chars);
    for b in bytes {
        if s.len() >= chars {
            break;
        }
        s.push_str(&format!("{b:02x}"));
    }
    s.truncate(chars);
    s
}

// ---------------------------------------------------------------------
// Account IDs
// ---------------------------------------------------------------------

pub fn account_id_email(address: &str) -> String {
    format!("email_{}", sanitize_identifier(address))
}

pub fn account_id_sms(phone: &str) -> String {
    format!("sms_{}", sanitize_identifier(phone))
}

pub fn account_id_signal(phone: &str) -> String {
    format!("signal_{}", sanitize_identifier(phone))
}

pub fn account_id_whatsapp(phone: &str) -> String {
    format!("whatsapp_{}", sanitize_identifier(phone))
}

pub fn account_id_discord(snowflake: &str) -> String {
    format!("discord_{snowflake}")
}

// ---------------------------------------------------------------------
// Thread IDs
// ---------------------------------------------------------------------

pub fn thread_id_signal_dm(peer_phone: &str) -> String {
    format!("signal_dm_{}", sanitize_identifier(peer_phone))
}

pub fn thread_id_signal_group(group_id: &str) -> String {
    format!("signal_group_{}", sanitize_identifier(group_id))
}

pub fn thread_id_sms_dm(peer_phone: &str) -> String {
    format!("sms_dm_{}", sanitize_identifier(peer_phone))
}

pub fn thread_id_whatsapp_group(group_jid: &str) -> String {
    format!("whatsapp_group_{}", sanitize_identifier(group_jid))
}

pub fn thread_id_whatsapp_dm(peer_jid: &str) -> String {
    format!("whatsapp_dm_{}", sanitize_identifier(peer_jid))
}

pub fn thread_id_whatsapp_broadcast(list_id: &str) -> String {
    format!("whatsapp_broadcast_{}", sanitize_identifier(list_id))
}

pub fn thread_id_discord_channel(channel_id: &str) -> String {
    format!("discord_channel_{channel_id}")
}

pub fn thread_id_discord_thread(thread_id: &str) -> String {
    format!("discord_thread_{thread_id}")
}

pub fn thread_id_discord_dm(channel_id: &str) -> String {
    format!("discord_dm_{channel_id}")
}

/// Conservative, deterministic email thread key: `account_id` plus the
/// originating `Message-Id` header (spec §4.7's "conservative function
/// of the account and the originating Message-Id header"). Using the
/// account rather than just the header keeps two accounts that both
/// receive a copy of the same message in separate threads.
pub fn thread_id_email(account_id: &str, message_id_header: &str) -> String {
    format!("email_thread_{}", short_hash(&[account_id, message_id_header]))
}

/// Registered `(prefix, platform, default type)` table used by the view
/// projector to synthesize an orphan thread record purely from its ID
/// (spec §4.4). Longest-prefix-first so e.g. `discord_thread_` is tried
/// before `discord_`-anything-else would be.
const THREAD_PREFIXES: &[(&str, Platform, ThreadType)] = &[
    ("signal_dm_", Platform::Signal, ThreadType::Dm),
    ("signal_group_", Platform::Signal, ThreadType::Group),
    ("sms_dm_", Platform::Sms, ThreadType::Dm),
    ("whatsapp_group_", Platform::WhatsApp, ThreadType::Group),
    ("whatsapp_dm_", Platform::WhatsApp, ThreadType::Dm),
    ("whatsapp_broadcast_", Platform::WhatsApp, ThreadType::Broadcast),
    ("discord_thread_", Platform::Discord, ThreadType::Topic),
    ("discord_channel_", Platform::Discord, ThreadType::Channel),
    ("discord_dm_", Platform::Discord, ThreadType::Dm),
    ("email_thread_", Platform::Email, ThreadType::Dm),
];

/// Infer `(platform, type)` from a thread ID's prefix alone. Returns
/// `None` for an ID that matches no registered convention.
pub fn infer_thread_platform_type(thread_id: &str) -> Option<(Platform, ThreadType)> {
    THREAD_PREFIXES
        .iter()
        .filter(|(prefix, _, _)| thread_id.starts_with(prefix))
        .max_by_key(|(prefix, _, _)| prefix.len())
        .map(|(_, platform, kind)| (*platform, *kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_identifier_lowercases_and_replaces_punctuation() {
        assert_eq!(sanitize_identifier("Alice@Example.COM"), "alice_example_com");
        assert_eq!(sanitize_identifier("+1 (555) 123-4567"), "_1_555_123_4567");
    }

    #[test]
    fn account_ids_carry_platform_prefix() {
        assert_eq!(account_id_email("alice@example.com"), "email_alice_example_com");
        assert_eq!(account_id_whatsapp("+15551234567"), "whatsapp__15551234567");
        assert_eq!(account_id_discord("123456789"), "discord_123456789");
    }

    #[test]
    fn email_thread_id_is_deterministic_and_account_scoped() {
        let a = thread_id_email("email_alice_example_com", "<abc@mail>");
        let b = thread_id_email("email_alice_example_com", "<abc@mail>");
        let c = thread_id_email("email_bob_example_com", "<abc@mail>");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("email_thread_"));
    }

    #[test]
    fn infer_thread_platform_type_covers_all_registered_conventions() {
        assert_eq!(
            infer_thread_platform_type("signal_dm_abc"),
            Some((Platform::Signal, ThreadType::Dm))
        );
        assert_eq!(
            infer_thread_platform_type("discord_thread_9"),
            Some((Platform::Discord, ThreadType::Topic))
        );
        assert_eq!(
            infer_thread_platform_type("discord_channel_9"),
            Some((Platform::Discord, ThreadType::Channel))
        );
        assert_eq!(infer_thread_platform_type("unknown_abc"), None);
    }

    #[test]
    fn infer_thread_platform_type_prefers_longest_matching_prefix() {
        // "discord_thread_" must win over a hypothetical shorter "discord_"
        // registration; this also guards against accidental prefix collisions.
        assert_eq!(
            infer_thread_platform_type("discord_thread_42"),
            Some((Platform::Discord, ThreadType::Topic))
        );
    }
}
