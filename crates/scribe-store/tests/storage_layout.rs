// Verify the on-disk layout matches spec §6 bit-exactly: compatibility
// across implementations depends on these paths, not just on the Rust
// API shape.

use scribe_core::ids;
use scribe_core::types::{AuthorRef, MessageRefs, SourceRef};
use scribe_core::{MessageInput, MessageKind, Platform};
use scribe_store::{CreateMessageOptions, MessageStore};

fn sample_input() -> MessageInput {
    MessageInput {
        kind: MessageKind::Signal,
        account_id: ids::account_id_signal("+15551234567"),
        author: AuthorRef::default(),
        created_at: 1_700_000_000_000,
        content: "hi".to_string(),
        title: None,
        visibility: None,
        refs: MessageRefs { thread_id: Some("signal_dm_bob".into()), ..Default::default() },
        source: SourceRef { platform: Platform::Signal, ..Default::default() },
        tags: vec![],
    }
}

#[test]
fn event_log_partition_path_is_date_keyed() {
    let dir = tempfile::tempdir().unwrap();
    let store = MessageStore::new(dir.path()).unwrap();
    store.create_message(sample_input(), CreateMessageOptions::default()).unwrap();

    let today = chrono::Utc::now();
    let path = dir.path().join("store/events").join(format!("{:04}", today.format("%Y"))).join(format!("{:02}", today.format("%m"))).join(format!("{:02}", today.format("%d"))).join("events.jsonl");
    assert!(path.is_file(), "expected partition file at {}", path.display());
}

#[test]
fn content_blob_path_uses_two_char_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let store = MessageStore::new(dir.path()).unwrap();
    let message = store.create_message(sample_input(), CreateMessageOptions::default()).unwrap();

    let bucket = &message.id[4..6];
    let path = dir.path().join("store/content").join(bucket).join(format!("{}.blob", message.id));
    assert!(path.is_file(), "expected blob at {}", path.display());
}

#[test]
fn view_files_land_under_threads_and_accounts() {
    let dir = tempfile::tempdir().unwrap();
    let store = MessageStore::new(dir.path()).unwrap();
    store.get_or_create_thread(
        "signal_dm_bob",
        scribe_core::ThreadType::Dm,
        scribe_core::ThreadSourceRef { platform: Platform::Signal, platform_id: None, room_id: None },
        1_700_000_000_000,
    )
    .unwrap();
    store.get_or_create_account("signal_alice", "Alice", 1_700_000_000_000).unwrap();

    assert!(dir.path().join("views/threads/signal_dm_bob.view").is_file());
    assert!(dir.path().join("views/accounts/signal_alice.view").is_file());
    assert!(dir.path().join("views/timeline").is_dir(), "timeline dir is reserved but must exist");
}

#[test]
fn content_blob_header_precedes_body_after_blank_line() {
    let dir = tempfile::tempdir().unwrap();
    let store = MessageStore::new(dir.path()).unwrap();
    let message = store.create_message(sample_input(), CreateMessageOptions::default()).unwrap();

    let bucket = &message.id[4..6];
    let path = dir.path().join("store/content").join(bucket).join(format!("{}.blob", message.id));
    let raw = std::fs::read_to_string(path).unwrap();
    let (header, body) = raw.split_once("\n\n").unwrap();
    assert!(header.lines().any(|l| l.starts_with("id: ")));
    assert_eq!(body, "hi");
}
