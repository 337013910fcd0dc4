//! Content-addressed blob store (spec §4.3).
//!
//! Each message body is written once, keyed by its CID, under
//! `content/<bucket>/<cid>.blob` where `bucket` is chars `[4..6]` of the
//! CID — the first two base58 characters after the `msg_` prefix. A blob
//! is a denormalized header (one `key: value` pair per line) followed by
//! a blank line and the raw body text.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use scribe_core::types::{AuthorRef, MessageRefs, SourceRef};
use scribe_core::{Message, MessageKind, Platform};

use crate::error::{Result, StoreError};

const CONTENT_DIR: &str = "content";

/// Derive the two-character fan-out bucket for `cid` (spec §4.3).
pub fn content_bucket(cid: &str) -> &str {
    let start = 4.min(cid.len());
    let end = 6.min(cid.len());
    &cid[start..end]
}

pub fn blob_path(base_path: &Path, cid: &str) -> PathBuf {
    base_path.join(CONTENT_DIR).join(content_bucket(cid)).join(format!("{cid}.blob"))
}

/// Everything reconstructable from a blob's header without re-scanning
/// the event log.
#[derive(Debug, Clone)]
pub struct BlobHeader {
    pub id: String,
    pub kind: MessageKind,
    pub account_id: String,
    pub created_at: i64,
    pub imported_at: i64,
    pub platform: Platform,
    pub author: AuthorRef,
    pub title: Option<String>,
    pub visibility: Option<String>,
    pub refs: MessageRefs,
    pub source: SourceRef,
    pub tags: Vec<(String, String)>,
}

/// Write `message`'s blob. Idempotent: the content store is write-once
/// per CID, so a duplicate write for the same CID is a harmless no-op
/// (spec §5 "the content store is write-once per CID").
pub fn write_blob(base_path: &Path, message: &Message) -> Result<()> {
    let path = blob_path(base_path, &message.id);
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut out = String::new();
    push_header_line(&mut out, "id", &message.id);
    push_header_line(&mut out, "kind", &message.kind.as_u8().to_string());
    push_header_line(&mut out, "account_id", &message.account_id);
    push_header_line(&mut out, "created_at", &message.created_at.to_string());
    push_header_line(&mut out, "imported_at", &message.imported_at.to_string());
    push_header_line(&mut out, "platform", &message.source.platform.to_string());
    if let Some(did) = &message.author.did {
        push_header_line(&mut out, "author_did", did);
    }
    if let Some(name) = &message.author.name {
        push_header_line(&mut out, "author_name", name);
    }
    if let Some(title) = &message.title {
        push_header_line(&mut out, "title", title);
    }
    if let Some(visibility) = &message.visibility {
        push_header_line(&mut out, "visibility", visibility);
    }
    if let Some(thread_id) = &message.refs.thread_id {
        push_header_line(&mut out, "thread_id", thread_id);
    }
    if let Some(reply_to) = &message.refs.reply_to {
        push_header_line(&mut out, "reply_to", reply_to);
    }
    if let Some(room_id) = &message.refs.room_id {
        push_header_line(&mut out, "room_id", room_id);
    }
    if let Some(platform_id) = &message.source.platform_id {
        push_header_line(&mut out, "platform_id", platform_id);
    }
    if let Some(session_id) = &message.source.session_id {
        push_header_line(&mut out, "session_id", session_id);
    }
    if let Some(agent_id) = &message.source.agent_id {
        push_header_line(&mut out, "agent_id", agent_id);
    }
    if !message.tags.is_empty() {
        let encoded = serde_json::to_string(&message.tags)?;
        push_header_line(&mut out, "tags", &encoded);
    }
    out.push('\n'); // blank line terminates the header
    out.push_str(&message.content);

    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
    file.write_all(out.as_bytes())?;
    file.sync_data()?;
    Ok(())
}

fn push_header_line(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str(": ");
    out.push_str(value);
    out.push('\n');
}

/// Read a blob back into its header and body (spec §4.3 `readContent`).
pub fn read_blob(base_path: &Path, cid: &str) -> Result<(BlobHeader, String)> {
    let path = blob_path(base_path, cid);
    let raw = std::fs::read_to_string(&path)?;
    parse_blob(&raw)
}

/// Parse a blob's raw text into header fields + body.
pub fn parse_blob(raw: &str) -> Result<(BlobHeader, String)> {
    let (header_text, body) = raw
        .split_once("\n\n")
        .ok_or_else(|| StoreError::Parse("blob missing header/body separator".to_string()))?;

    let mut id = None;
    let mut kind = None;
    let mut account_id = None;
    let mut created_at = None;
    let mut imported_at = None;
    let mut platform = None;
    let mut author = AuthorRef::default();
    let mut title = None;
    let mut visibility = None;
    let mut refs = MessageRefs::default();
    let mut platform_id = None;
    let mut session_id = None;
    let mut agent_id = None;
    let mut tags = Vec::new();

    for line in header_text.lines() {
        let Some((key, value)) = line.split_once(": ") else { continue };
        match key {
            "id" => id = Some(value.to_string()),
            "kind" => kind = value.parse::<u8>().ok().and_then(MessageKind::from_u8),
            "account_id" => account_id = Some(value.to_string()),
            "created_at" => created_at = value.parse().ok(),
            "imported_at" => imported_at = value.parse().ok(),
            "platform" => platform = value.parse().ok(),
            "author_did" => author.did = Some(value.to_string()),
            "author_name" => author.name = Some(value.to_string()),
            "title" => title = Some(value.to_string()),
            "visibility" => visibility = Some(value.to_string()),
            "thread_id" => refs.thread_id = Some(value.to_string()),
            "reply_to" => refs.reply_to = Some(value.to_string()),
            "room_id" => refs.room_id = Some(value.to_string()),
            "platform_id" => platform_id = Some(value.to_string()),
            "session_id" => session_id = Some(value.to_string()),
            "agent_id" => agent_id = Some(value.to_string()),
            "tags" => tags = decode_header_value(value),
            _ => {}
        }
    }

    let header = BlobHeader {
        id: id.ok_or_else(|| StoreError::Parse("blob header missing `id`".to_string()))?,
        kind: kind.ok_or_else(|| StoreError::Parse("blob header missing/invalid `kind`".to_string()))?,
        account_id: account_id.ok_or_else(|| StoreError::Parse("blob header missing `account_id`".to_string()))?,
        created_at: created_at.ok_or_else(|| StoreError::Parse("blob header missing `created_at`".to_string()))?,
        imported_at: imported_at.ok_or_else(|| StoreError::Parse("blob header missing `imported_at`".to_string()))?,
        platform: platform.ok_or_else(|| StoreError::Parse("blob header missing `platform`".to_string()))?,
        author,
        title,
        visibility,
        refs,
        source: SourceRef {
            platform: platform.unwrap(),
            platform_id,
            url: None,
            session_id,
            agent_id,
        },
        tags,
    };
    Ok((header, body.to_string()))
}

/// Numeric, then JSON, then plain-string decoding, per spec §6's blob
/// header decode order. Only used for the `tags` field today but kept
/// general since future header keys may reuse it.
fn decode_header_value(raw: &str) -> Vec<(String, String)> {
    if let Ok(pairs) = serde_json::from_str::<Vec<(String, String)>>(raw) {
        return pairs;
    }
    Vec::new()
}

/// Scan the content store for blobs with no matching event, used by the
/// crash-recovery path (spec §8 scenario F). Returns the orphan CIDs.
pub fn scan_orphan_blobs(base_path: &Path, known_ids: &std::collections::HashSet<String>) -> Result<Vec<String>> {
    let root = base_path.join(CONTENT_DIR);
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut orphans = Vec::new();
    for bucket in std::fs::read_dir(&root)? {
        let bucket = bucket?.path();
        if !bucket.is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(&bucket)? {
            let path = entry?.path();
            let Some(name) = path.file_stem().and_then(|n| n.to_str()) else { continue };
            if path.extension().and_then(|e| e.to_str()) != Some("blob") {
                continue;
            }
            if !known_ids.contains(name) {
                orphans.push(name.to_string());
            }
        }
    }
    orphans.sort();
    Ok(orphans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::types::SourceRef;
    use scribe_core::{MessageKind, Platform};

    fn sample_message() -> Message {
        Message {
            id: "msg_abcd1234567890".into(),
            kind: MessageKind::Signal,
            account_id: "signal_alice".into(),
            author: AuthorRef { name: Some("Alice".into()), ..Default::default() },
            created_at: 1_700_000_000_000,
            imported_at: 1_700_000_000_100,
            content: "hello world".into(),
            title: None,
            visibility: None,
            refs: MessageRefs { thread_id: Some("signal_dm_bob".into()), ..Default::default() },
            source: SourceRef { platform: Platform::Signal, platform_id: Some("env-1".into()), ..Default::default() },
            tags: vec![("direction".into(), "incoming".into())],
        }
    }

    #[test]
    fn content_bucket_is_chars_four_to_six() {
        assert_eq!(content_bucket("msg_XYabcdef"), "ab");
    }

    #[test]
    fn write_then_read_round_trips_header_and_body() {
        let dir = tempfile::tempdir().unwrap();
        let msg = sample_message();
        write_blob(dir.path(), &msg).unwrap();

        let (header, body) = read_blob(dir.path(), &msg.id).unwrap();
        assert_eq!(header.id, msg.id);
        assert_eq!(header.kind, msg.kind);
        assert_eq!(header.refs.thread_id.as_deref(), Some("signal_dm_bob"));
        assert_eq!(body, "hello world");
        assert_eq!(header.tags, msg.tags);
    }

    #[test]
    fn duplicate_write_is_idempotent_noop() {
        let dir = tempfile::tempdir().unwrap();
        let msg = sample_message();
        write_blob(dir.path(), &msg).unwrap();
        let path = blob_path(dir.path(), &msg.id);
        let first_write = std::fs::metadata(&path).unwrap().modified().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        write_blob(dir.path(), &msg).unwrap();
        let second_write = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(first_write, second_write);
    }

    #[test]
    fn scan_orphan_blobs_finds_unreferenced_cid() {
        let dir = tempfile::tempdir().unwrap();
        let msg = sample_message();
        write_blob(dir.path(), &msg).unwrap();

        let known = std::collections::HashSet::new();
        let orphans = scan_orphan_blobs(dir.path(), &known).unwrap();
        assert_eq!(orphans, vec![msg.id.clone()]);

        let mut known = std::collections::HashSet::new();
        known.insert(msg.id.clone());
        assert!(scan_orphan_blobs(dir.path(), &known).unwrap().is_empty());
    }
}
