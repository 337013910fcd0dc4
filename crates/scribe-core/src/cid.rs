//! Content-Identifier (CID) generation (spec §4.1).
//!
//! `msg_` + base58(SHA-256 over the canonical subset
//! `{content, kind, created_at, account_id}`). The full 32-byte digest
//! is kept — no truncation — to preserve collision resistance; the four
//! input fields are chosen so that replaying identical content from the
//! same author at the same timestamp reproduces the same CID (needed
//! for idempotent re-import) while two different authors quoting the
//! same text do not collide.

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::base58;
use crate::canonical::canonicalize;
use crate::types::MessageKind;

pub const CID_PREFIX: &str = "msg_";
const LEGACY_CID_PREFIX: &str = "cid_";

/// The subset of a message's fields the CID is derived from.
#[derive(Debug, Clone)]
pub struct CidInput<'a> {
    pub content: &'a str,
    pub kind: MessageKind,
    pub created_at: i64,
    pub account_id: &'a str,
}

/// Derive the deterministic content identifier for `input`.
pub fn generate_cid(input: &CidInput<'_>) -> String {
    let canonical = canonical_subset(input);
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{CID_PREFIX}{}", base58::encode(&digest))
}

/// Check that `cid` is exactly what `generate_cid(input)` would produce.
pub fn verify_cid(cid: &str, input: &CidInput<'_>) -> bool {
    cid == generate_cid(input)
}

/// Structural validity check only: correct prefix, base58 alphabet, and
/// a length consistent with an un-truncated SHA-256 digest (44 chars of
/// base58 for 32 bytes, with some slack for leading-zero-byte runs).
pub fn is_valid_cid(s: &str) -> bool {
    let rest = match s.strip_prefix(CID_PREFIX).or_else(|| s.strip_prefix(LEGACY_CID_PREFIX)) {
        Some(r) => r,
        None => return false,
    };
    if !(40..=50).contains(&rest.len()) {
        return false;
    }
    rest.bytes().all(is_base58_byte)
}

fn is_base58_byte(b: u8) -> bool {
    matches!(b, b'1'..=b'9' | b'A'..=b'H' | b'J'..=b'N' | b'P'..=b'Z' | b'a'..=b'k' | b'm'..=b'z')
}

fn canonical_subset(input: &CidInput<'_>) -> String {
    let value = json!({
        "content": input.content,
        "kind": input.kind.as_u8(),
        "created_at": input.created_at,
        "account_id": input.account_id,
    });
    canonicalize(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CidInput<'static> {
        CidInput {
            content: "hi",
            kind: MessageKind::Email,
            created_at: 1_700_000_000_000,
            account_id: "email_alice_example_com",
        }
    }

    #[test]
    fn scenario_a_deterministic_cid() {
        let input = sample();
        let a = generate_cid(&input);
        let b = generate_cid(&input);
        assert_eq!(a, b);
        assert!(a.starts_with(CID_PREFIX));
        assert_eq!(a.len(), CID_PREFIX.len() + 44);
    }

    #[test]
    fn changing_created_at_changes_cid() {
        let mut input = sample();
        let original = generate_cid(&input);
        input.created_at += 1;
        let changed = generate_cid(&input);
        assert_ne!(original, changed);
    }

    #[test]
    fn changing_account_changes_cid_but_not_content() {
        let mut input = sample();
        let original = generate_cid(&input);
        input.account_id = "email_bob_example_com";
        assert_ne!(original, generate_cid(&input));
    }

    #[test]
    fn verify_cid_round_trips() {
        let input = sample();
        let cid = generate_cid(&input);
        assert!(verify_cid(&cid, &input));
        assert!(!verify_cid("msg_garbage", &input));
    }

    #[test]
    fn is_valid_cid_accepts_generated_ids() {
        let cid = generate_cid(&sample());
        assert!(is_valid_cid(&cid));
    }

    #[test]
    fn is_valid_cid_rejects_bad_prefix_and_alphabet() {
        assert!(!is_valid_cid("nope_1234567890"));
        assert!(!is_valid_cid("msg_"));
        assert!(!is_valid_cid(&format!("msg_{}", "0".repeat(44))));
    }
}
