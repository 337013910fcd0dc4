//! Append-only, date-partitioned event log (spec §4.2).
//!
//! Partitioning is keyed by each event's UTC `ts`: one record-per-line
//! file per day at `events/YYYY/MM/DD/events.jsonl`. Within a partition,
//! writes are serialized by a per-day lock so concurrent sync services
//! never interleave two records into the same line.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{Datelike, NaiveDate};
use scribe_core::Event;
use tracing::warn;

use crate::error::{Result, StoreError};

const EVENTS_DIR: &str = "events";
const EVENTS_FILE: &str = "events.jsonl";

fn partition_dir(base_path: &Path, date: NaiveDate) -> PathBuf {
    base_path
        .join(EVENTS_DIR)
        .join(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
        .join(format!("{:02}", date.day()))
}

/// Serializes appends to the event log, one lock per calendar day so
/// writers to different partitions never contend.
pub struct PartitionWriter {
    base_path: PathBuf,
    locks: Mutex<HashMap<NaiveDate, Arc<Mutex<()>>>>,
}

impl PartitionWriter {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, date: NaiveDate) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(date).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Append one event, durable on return (spec §4.2).
    pub fn append(&self, event: &Event) -> Result<()> {
        let date = event.ts.date_naive();
        let day_lock = self.lock_for(date);
        let _guard = day_lock.lock().unwrap();

        let dir = partition_dir(&self.base_path, date);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(EVENTS_FILE);

        let line = serde_json::to_string(event)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_data()?;
        Ok(())
    }
}

/// Reads events back in lexicographic partition order (year, month, day,
/// then line order within the day's file) — spec's `getAllEvents`.
pub struct EventLogReader {
    base_path: PathBuf,
}

impl EventLogReader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self { base_path: base_path.into() }
    }

    /// Collect every partition file under `events/`, sorted so that
    /// directory traversal order matches lexicographic date order.
    fn partition_files(&self) -> Result<Vec<PathBuf>> {
        let events_root = self.base_path.join(EVENTS_DIR);
        if !events_root.exists() {
            return Ok(Vec::new());
        }

        let mut years = sorted_subdirs(&events_root)?;
        let mut files = Vec::new();
        for year in years.drain(..) {
            let mut months = sorted_subdirs(&year)?;
            for month in months.drain(..) {
                let mut days = sorted_subdirs(&month)?;
                for day in days.drain(..) {
                    let candidate = day.join(EVENTS_FILE);
                    if candidate.is_file() {
                        files.push(candidate);
                    }
                }
            }
        }
        Ok(files)
    }

    /// Yield every well-formed event across all partitions in order,
    /// silently discarding malformed lines (spec §4.2 failure semantics).
    pub fn read_all(&self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for path in self.partition_files()? {
            events.extend(read_partition_file(&path)?);
        }
        Ok(events)
    }
}

fn sorted_subdirs(parent: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(parent)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    entries.sort();
    Ok(entries)
}

/// Read one partition file, tolerating a malformed trailing line (the
/// crash-recovery case: an append was interrupted mid-write).
fn read_partition_file(path: &Path) -> Result<Vec<Event>> {
    let file = std::fs::File::open(path)?;
    let lines: Vec<String> = BufReader::new(file).lines().collect::<std::io::Result<_>>()?;

    let mut events = Vec::with_capacity(lines.len());
    let last_index = lines.len().saturating_sub(1);
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(line) {
            Ok(event) => events.push(event),
            Err(e) => {
                if i == last_index {
                    warn!(path = %path.display(), error = %e, "discarding malformed trailing event record");
                } else {
                    warn!(path = %path.display(), line = i, error = %e, "discarding malformed event record");
                }
            }
        }
    }
    Ok(events)
}

/// Structural validity check for a partition path's date component, used
/// defensively when a caller hands us a path that didn't come from
/// [`EventLogReader::partition_files`].
#[allow(dead_code)]
fn validate_partition_path(path: &Path) -> Result<()> {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| *n == EVENTS_FILE)
        .ok_or_else(|| StoreError::Validation(format!("not a partition file: {}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn temp_base() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn append_and_read_round_trips() {
        let dir = temp_base();
        let writer = PartitionWriter::new(dir.path());
        let ts = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let ev1 = Event::message_created(ts, "msg_a");
        let ev2 = Event::message_created(ts, "msg_b");
        writer.append(&ev1).unwrap();
        writer.append(&ev2).unwrap();

        let reader = EventLogReader::new(dir.path());
        let events = reader.read_all().unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn partitions_by_utc_date() {
        let dir = temp_base();
        let writer = PartitionWriter::new(dir.path());
        let day1 = Utc.with_ymd_and_hms(2026, 1, 15, 23, 59, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 1, 16, 0, 0, 1).unwrap();
        writer.append(&Event::message_created(day1, "msg_a")).unwrap();
        writer.append(&Event::message_created(day2, "msg_b")).unwrap();

        assert!(dir.path().join("events/2026/01/15/events.jsonl").is_file());
        assert!(dir.path().join("events/2026/01/16/events.jsonl").is_file());
    }

    #[test]
    fn tolerates_malformed_trailing_line() {
        let dir = temp_base();
        let writer = PartitionWriter::new(dir.path());
        let ts = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        writer.append(&Event::message_created(ts, "msg_a")).unwrap();

        let path = dir.path().join("events/2026/01/15/events.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"ts\":\"2026-01-15T10:00:01Z\",\"op\":\"mess").unwrap(); // truncated

        let reader = EventLogReader::new(dir.path());
        let events = reader.read_all().unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn reads_in_lexicographic_partition_order() {
        let dir = temp_base();
        let writer = PartitionWriter::new(dir.path());
        let d1 = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let d2 = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        writer.append(&Event::message_created(d2, "msg_late")).unwrap();
        writer.append(&Event::message_created(d1, "msg_early")).unwrap();

        let events = EventLogReader::new(dir.path()).read_all().unwrap();
        // Lexicographic path order (02 before 10), not insertion order.
        assert_eq!(events[0].body.op(), "message.created");
        match &events[0].body {
            scribe_core::EventBody::MessageCreated(d) => assert_eq!(d.id, "msg_early"),
            _ => panic!("wrong variant"),
        }
    }
}
