//! Public storage API used by every sync service and the top-level
//! binary (spec §4.5).

use std::path::{Path, PathBuf};

use scribe_core::cid::{generate_cid, CidInput};
use scribe_core::types::MAX_CONTENT_CHARS;
use scribe_core::{Account, Event, EventBody, Message, MessageInput, Platform, Thread, ThreadSourceRef, ThreadType};
use tracing::{info, warn};

use crate::content::{self, BlobHeader};
use crate::error::{Result, StoreError};
use crate::eventlog::{EventLogReader, PartitionWriter};
use crate::views;

/// Best-effort side channel notified on every durable `createMessage`
/// (spec §4.5). The real implementation is an external collaborator —
/// out of scope here — so the façade only needs the seam.
pub trait SearchSink: Send + Sync {
    fn index(&self, message: &Message);
}

/// Default sink used when no real one is configured. Indexing failures
/// must never affect durability (spec §7 "if the search sink throws,
/// the event is still durable").
pub struct NullSearchSink;

impl SearchSink for NullSearchSink {
    fn index(&self, _message: &Message) {}
}

/// Options accepted by [`MessageStore::create_message`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateMessageOptions {
    /// Large batch imports set this to bypass the incremental thread
    /// update and call `rebuild_thread_views` once at the end instead
    /// (spec §4.4: "prevents quadratic work and lock contention").
    pub skip_thread_update: bool,
}

/// Filter clauses for [`MessageStore::list_messages`]; every clause is
/// AND'd (spec §4.5).
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub kinds: Option<Vec<scribe_core::MessageKind>>,
    pub accounts: Option<Vec<String>>,
    pub threads: Option<Vec<String>>,
    pub platforms: Option<Vec<Platform>>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub message_count: u64,
    pub account_count: u64,
    pub thread_count: u64,
    pub platforms: Vec<Platform>,
    pub date_range: Option<(i64, i64)>,
}

/// Content-addressed, append-only archive plus the view projector,
/// wired together behind one façade (spec §4.5).
pub struct MessageStore {
    base_path: PathBuf,
    writer: PartitionWriter,
    reader: EventLogReader,
    sink: Box<dyn SearchSink>,
}

impl MessageStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_sink(base_path, Box::new(NullSearchSink))
    }

    pub fn with_sink(base_path: impl Into<PathBuf>, sink: Box<dyn SearchSink>) -> Result<Self> {
        let base_path = base_path.into();
        let store_path = base_path.join("store");
        let views_path = base_path.join("views");
        std::fs::create_dir_all(&store_path)?;
        views::ensure_layout(&views_path)?;

        let writer = PartitionWriter::new(&store_path);
        let reader = EventLogReader::new(&store_path);

        Ok(Self { base_path, writer, reader, sink })
    }

    fn store_path(&self) -> PathBuf {
        self.base_path.join("store")
    }

    fn views_path(&self) -> PathBuf {
        self.base_path.join("views")
    }

    /// Create a message, or return the existing one if `input` produces
    /// an already-known CID (spec §4.5 idempotency).
    pub fn create_message(&self, input: MessageInput, opts: CreateMessageOptions) -> Result<Message> {
        if input.content.is_empty() {
            return Err(StoreError::Validation("message content must be non-empty".to_string()));
        }
        if input.created_at <= 0 {
            return Err(StoreError::Validation("created_at must be > 0".to_string()));
        }

        let content = clamp_content(&input.content);
        let cid = generate_cid(&CidInput {
            content: &content,
            kind: input.kind,
            created_at: input.created_at,
            account_id: &input.account_id,
        });

        if let Some(existing) = self.get_message(&cid)? {
            return Ok(existing);
        }

        let imported_at = chrono::Utc::now().timestamp_millis();
        let message = Message {
            id: cid.clone(),
            kind: input.kind,
            account_id: input.account_id,
            author: input.author,
            created_at: input.created_at,
            imported_at,
            content,
            title: input.title,
            visibility: input.visibility,
            refs: input.refs,
            source: input.source,
            tags: input.tags,
        };

        // Content before event — an interrupted write leaves a
        // recoverable orphan blob rather than a phantom event (spec §4.3).
        content::write_blob(&self.store_path(), &message)?;

        let event = Event::message_created(
            chrono::DateTime::from_timestamp_millis(imported_at).unwrap_or_else(chrono::Utc::now),
            message.id.clone(),
        );
        self.writer.append(&event)?;

        if !opts.skip_thread_update {
            if let Some(thread_id) = &message.refs.thread_id {
                views::bump_thread_stats(&self.views_path(), thread_id, message.created_at)?;
            }
            views::bump_account_stats(&self.views_path(), &message.account_id)?;
        }

        self.sink.index(&message);
        info!(id = %message.id, kind = ?message.kind, "message stored");
        Ok(message)
    }

    /// Fast path: read straight from the content blob. Falls back to a
    /// full event-log scan if the blob is missing or malformed, logging
    /// a warning either way (spec §4.5).
    pub fn get_message(&self, id: &str) -> Result<Option<Message>> {
        match content::read_blob(&self.store_path(), id) {
            Ok((header, body)) => Ok(Some(header_to_message(header, body))),
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => self.get_message_from_log(id),
            Err(StoreError::Parse(msg)) => {
                warn!(id, error = %msg, "blob unreadable, falling back to event log scan");
                self.get_message_from_log(id)
            }
            Err(e) => Err(e),
        }
    }

    fn get_message_from_log(&self, id: &str) -> Result<Option<Message>> {
        for event in self.reader.read_all()? {
            if let EventBody::MessageCreated(data) = &event.body {
                if data.id == id {
                    // The event log doesn't carry the full message body;
                    // a blob-less record means the content write never
                    // landed. Nothing to reconstruct.
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }

    /// Lazily filtered, partition-ordered message stream (spec §4.5).
    pub fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>> {
        let mut out = Vec::new();
        let mut skipped = 0usize;
        for event in self.reader.read_all()? {
            let EventBody::MessageCreated(data) = &event.body else { continue };
            let Some(message) = self.get_message(&data.id)? else { continue };
            if !matches_filter(&message, filter) {
                continue;
            }
            if skipped < filter.offset {
                skipped += 1;
                continue;
            }
            if let Some(limit) = filter.limit {
                if out.len() >= limit {
                    break;
                }
            }
            out.push(message);
        }
        Ok(out)
    }

    pub fn get_thread_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        self.list_messages(&MessageFilter { threads: Some(vec![thread_id.to_string()]), ..Default::default() })
    }

    pub fn get_or_create_account(&self, id: &str, name: &str, created_at: i64) -> Result<Account> {
        if let Some(existing) = views::read_account_view(&self.views_path(), id)? {
            return Ok(existing);
        }
        let account = views::new_account(id.to_string(), name.to_string(), created_at);
        views::write_account_view(&self.views_path(), &account)?;
        let event = Event::account_created(chrono::Utc::now(), id.to_string());
        self.writer.append(&event)?;
        Ok(account)
    }

    pub fn get_or_create_thread(
        &self,
        id: &str,
        kind: ThreadType,
        source: ThreadSourceRef,
        created_at: i64,
    ) -> Result<Thread> {
        if let Some(existing) = views::read_thread_view(&self.views_path(), id)? {
            return Ok(existing);
        }
        let thread = Thread {
            id: id.to_string(),
            kind,
            title: None,
            participants: Vec::new(),
            source,
            created_at,
            message_count: 0,
            last_message_at: None,
        };
        views::write_thread_view(&self.views_path(), &thread)?;
        let event = Event::thread_created(chrono::Utc::now(), id.to_string());
        self.writer.append(&event)?;
        Ok(thread)
    }

    /// Full scan over the event log, recomputing exact thread stats and
    /// synthesizing orphan threads (spec §4.4, §8 scenario E).
    pub fn rebuild_thread_views(&self) -> Result<views::RebuildStats> {
        let messages = self.list_messages(&MessageFilter::default())?;
        let declared_threads = declared_threads_from_views(&self.views_path(), &messages)?;

        let per_message: Vec<(String, i64)> = messages
            .iter()
            .filter_map(|m| m.refs.thread_id.as_ref().map(|t| (t.clone(), m.created_at)))
            .collect();

        views::rebuild_from_messages(&self.views_path(), &declared_threads, &per_message)
    }

    pub fn get_stats(&self) -> Result<StoreStats> {
        let messages = self.list_messages(&MessageFilter::default())?;
        let mut accounts = std::collections::HashSet::new();
        let mut threads = std::collections::HashSet::new();
        let mut platforms = std::collections::HashSet::new();
        let mut min_ts = None;
        let mut max_ts = None;

        for m in &messages {
            accounts.insert(m.account_id.clone());
            if let Some(t) = &m.refs.thread_id {
                threads.insert(t.clone());
            }
            platforms.insert(m.source.platform);
            min_ts = Some(min_ts.map_or(m.created_at, |v: i64| v.min(m.created_at)));
            max_ts = Some(max_ts.map_or(m.created_at, |v: i64| v.max(m.created_at)));
        }

        Ok(StoreStats {
            message_count: messages.len() as u64,
            account_count: accounts.len() as u64,
            thread_count: threads.len() as u64,
            platforms: platforms.into_iter().collect(),
            date_range: min_ts.zip(max_ts),
        })
    }
}

fn declared_threads_from_views(views_path: &Path, messages: &[Message]) -> Result<Vec<Thread>> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for m in messages {
        if let Some(thread_id) = &m.refs.thread_id {
            if seen.insert(thread_id.clone()) {
                if let Some(thread) = views::read_thread_view(views_path, thread_id)? {
                    out.push(thread);
                }
            }
        }
    }
    Ok(out)
}

fn clamp_content(content: &str) -> String {
    if content.chars().count() <= MAX_CONTENT_CHARS {
        content.to_string()
    } else {
        content.chars().take(MAX_CONTENT_CHARS).collect()
    }
}

fn header_to_message(header: BlobHeader, body: String) -> Message {
    Message {
        id: header.id,
        kind: header.kind,
        account_id: header.account_id,
        author: header.author,
        created_at: header.created_at,
        imported_at: header.imported_at,
        content: body,
        title: header.title,
        visibility: header.visibility,
        refs: header.refs,
        source: header.source,
        tags: header.tags,
    }
}

fn matches_filter(message: &Message, filter: &MessageFilter) -> bool {
    if let Some(kinds) = &filter.kinds {
        if !kinds.contains(&message.kind) {
            return false;
        }
    }
    if let Some(accounts) = &filter.accounts {
        if !accounts.contains(&message.account_id) {
            return false;
        }
    }
    if let Some(threads) = &filter.threads {
        let matches = message.refs.thread_id.as_ref().is_some_and(|t| threads.contains(t));
        if !matches {
            return false;
        }
    }
    if let Some(platforms) = &filter.platforms {
        if !platforms.contains(&message.source.platform) {
            return false;
        }
    }
    if let Some(since) = filter.since {
        if message.created_at < since {
            return false;
        }
    }
    if let Some(until) = filter.until {
        if message.created_at > until {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::ids;
    use scribe_core::types::{AuthorRef, MessageRefs, SourceRef};
    use scribe_core::MessageKind;

    fn sample_input(content: &str, created_at: i64) -> MessageInput {
        MessageInput {
            kind: MessageKind::Signal,
            account_id: ids::account_id_signal("+15551234567"),
            author: AuthorRef::default(),
            created_at,
            content: content.to_string(),
            title: None,
            visibility: None,
            refs: MessageRefs { thread_id: Some("signal_dm_bob".into()), ..Default::default() },
            source: SourceRef { platform: Platform::Signal, ..Default::default() },
            tags: vec![],
        }
    }

    #[test]
    fn create_message_is_idempotent_by_cid_scenario_b() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path()).unwrap();
        let input = sample_input("hello", 1_700_000_000_000);

        let first = store.create_message(input.clone(), CreateMessageOptions::default()).unwrap();
        let second = store.create_message(input, CreateMessageOptions::default()).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.get_stats().unwrap().message_count, 1);
    }

    #[test]
    fn create_message_rejects_empty_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path()).unwrap();
        let input = sample_input("", 1_700_000_000_000);
        let err = store.create_message(input, CreateMessageOptions::default()).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn get_message_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path()).unwrap();
        let created = store.create_message(sample_input("hi there", 5), CreateMessageOptions::default()).unwrap();
        let fetched = store.get_message(&created.id).unwrap().unwrap();
        assert_eq!(fetched.content, "hi there");
    }

    #[test]
    fn rebuild_reports_orphan_thread_scenario_e() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path()).unwrap();
        for (content, ts) in [("a", 1), ("b", 2), ("c", 3)] {
            store
                .create_message(sample_input(content, ts), CreateMessageOptions { skip_thread_update: true })
                .unwrap();
        }
        let stats = store.rebuild_thread_views().unwrap();
        assert_eq!(stats.threads, 1);
        assert_eq!(stats.messages, 3);
        assert_eq!(stats.orphans, 1);
    }

    #[test]
    fn list_messages_respects_limit_and_offset() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path()).unwrap();
        for (content, ts) in [("a", 1), ("b", 2), ("c", 3)] {
            store.create_message(sample_input(content, ts), CreateMessageOptions::default()).unwrap();
        }
        let none = store.list_messages(&MessageFilter { limit: Some(0), ..Default::default() }).unwrap();
        assert!(none.is_empty());

        let overshoot = store.list_messages(&MessageFilter { offset: 100, ..Default::default() }).unwrap();
        assert!(overshoot.is_empty());
    }

    #[test]
    fn get_or_create_account_emits_created_event_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path()).unwrap();
        let a1 = store.get_or_create_account("signal_alice", "Alice", 1).unwrap();
        let a2 = store.get_or_create_account("signal_alice", "Alice", 1).unwrap();
        assert_eq!(a1.id, a2.id);
    }
}
