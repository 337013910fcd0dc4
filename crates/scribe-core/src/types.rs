//! Core data model (spec §3): `Message`, `Account`, `Thread`, `Event`,
//! and the small enums/identity shapes they share.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Maximum body length a sync service should clamp content to before
/// handing a `MessageInput` to the store (spec §3, §4.7).
pub const MAX_CONTENT_CHARS: usize = 50_000;

/// Platform tag, stored as a small integer on the wire (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Email = 0,
    Sms = 1,
    Signal = 2,
    WhatsApp = 3,
    Discord = 4,
}

impl MessageKind {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Email),
            1 => Some(Self::Sms),
            2 => Some(Self::Signal),
            3 => Some(Self::WhatsApp),
            4 => Some(Self::Discord),
            _ => None,
        }
    }

    pub fn platform(self) -> Platform {
        match self {
            Self::Email => Platform::Email,
            Self::Sms => Platform::Sms,
            Self::Signal => Platform::Signal,
            Self::WhatsApp => Platform::WhatsApp,
            Self::Discord => Platform::Discord,
        }
    }
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(d)?;
        MessageKind::from_u8(raw).ok_or_else(|| DeError::custom(format!("unknown message kind: {raw}")))
    }
}

/// String-keyed platform identifier, used throughout IDs and tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Email,
    Sms,
    Signal,
    WhatsApp,
    Discord,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Email => "email",
            Platform::Sms => "sms",
            Platform::Signal => "signal",
            Platform::WhatsApp => "whatsapp",
            Platform::Discord => "discord",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Platform {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Platform::Email),
            "sms" => Ok(Platform::Sms),
            "signal" => Ok(Platform::Signal),
            "whatsapp" => Ok(Platform::WhatsApp),
            "discord" => Ok(Platform::Discord),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Denormalized display metadata for a message's author (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
}

/// Thread/reply/room linkage for a message (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
}

/// The tuple `(platform, platform_id)` identifies a message in its
/// origin system (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRef {
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

/// Conventional tag keys (spec §3). Not exhaustive — sync services may
/// attach additional platform-specific pairs.
pub mod tag_keys {
    pub const DIRECTION: &str = "direction";
    pub const SOURCE: &str = "source";
    pub const MESSAGE_TYPE: &str = "message_type";
    pub const PHONE_NUMBER: &str = "phone_number";
}

pub const DIRECTION_INCOMING: &str = "incoming";
pub const DIRECTION_OUTGOING: &str = "outgoing";

/// One communication atom (spec §3). Immutable once created; the only
/// way it enters the archive is a `message.created` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub kind: MessageKind,
    pub account_id: String,
    #[serde(default)]
    pub author: AuthorRef,
    pub created_at: i64,
    pub imported_at: i64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(default)]
    pub refs: MessageRefs,
    pub source: SourceRef,
    /// Ordered (key, value) pairs — not a map, since duplicate keys and
    /// order are both meaningful (spec §3).
    #[serde(default)]
    pub tags: Vec<(String, String)>,
}

impl Message {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// Input to `MessageStore::create_message` before a CID has been
/// assigned (spec §4.5).
#[derive(Debug, Clone)]
pub struct MessageInput {
    pub kind: MessageKind,
    pub account_id: String,
    pub author: AuthorRef,
    pub created_at: i64,
    pub content: String,
    pub title: Option<String>,
    pub visibility: Option<String>,
    pub refs: MessageRefs,
    pub source: SourceRef,
    pub tags: Vec<(String, String)>,
}

/// A conversation scope (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadType {
    Dm,
    Group,
    Channel,
    Room,
    Topic,
    Broadcast,
}

impl fmt::Display for ThreadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThreadType::Dm => "dm",
            ThreadType::Group => "group",
            ThreadType::Channel => "channel",
            ThreadType::Room => "room",
            ThreadType::Topic => "topic",
            ThreadType::Broadcast => "broadcast",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadSourceRef {
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thread {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ThreadType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    pub source: ThreadSourceRef,
    pub created_at: i64,
    pub message_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountStats {
    pub message_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountIdentity {
    pub platform: Platform,
    pub handle: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub identities: Vec<AccountIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_self: Option<bool>,
    pub created_at: i64,
    #[serde(default)]
    pub stats: AccountStats,
}

// ---------------------------------------------------------------------
// Event log record (spec §3, §6)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageCreatedData {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountCreatedData {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadCreatedData {
    pub id: String,
}

/// The `op` discriminant plus its payload. Unknown ops round-trip as
/// `Unknown` so a reader can tolerate a newer writer (spec §6: "A parser
/// MUST tolerate unknown top-level keys and unknown `op` values").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventBody {
    MessageCreated(MessageCreatedData),
    AccountCreated(AccountCreatedData),
    ThreadCreated(ThreadCreatedData),
    Unknown { op: String, data: Value },
}

impl EventBody {
    pub fn op(&self) -> &str {
        match self {
            EventBody::MessageCreated(_) => "message.created",
            EventBody::AccountCreated(_) => "account.created",
            EventBody::ThreadCreated(_) => "thread.created",
            EventBody::Unknown { op, .. } => op.as_str(),
        }
    }
}

/// One line of the event log: `{ ts, op, data }` (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub ts: DateTime<Utc>,
    pub body: EventBody,
}

impl Event {
    pub fn message_created(ts: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self {
            ts,
            body: EventBody::MessageCreated(MessageCreatedData { id: id.into() }),
        }
    }

    pub fn account_created(ts: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self {
            ts,
            body: EventBody::AccountCreated(AccountCreatedData { id: id.into() }),
        }
    }

    pub fn thread_created(ts: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self {
            ts,
            body: EventBody::ThreadCreated(ThreadCreatedData { id: id.into() }),
        }
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = s.serialize_map(Some(3))?;
        map.serialize_entry("ts", &self.ts.to_rfc3339())?;
        map.serialize_entry("op", self.body.op())?;
        match &self.body {
            EventBody::MessageCreated(d) => map.serialize_entry("data", d)?,
            EventBody::AccountCreated(d) => map.serialize_entry("data", d)?,
            EventBody::ThreadCreated(d) => map.serialize_entry("data", d)?,
            EventBody::Unknown { data, .. } => map.serialize_entry("data", data)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(d)?;
        let obj = raw.as_object().ok_or_else(|| DeError::custom("event record must be a JSON object"))?;

        let ts_str = obj
            .get("ts")
            .and_then(Value::as_str)
            .ok_or_else(|| DeError::custom("event record missing `ts`"))?;
        let ts = DateTime::parse_from_rfc3339(ts_str)
            .map_err(|e| DeError::custom(format!("invalid `ts`: {e}")))?
            .with_timezone(&Utc);

        let op = obj
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| DeError::custom("event record missing `op`"))?
            .to_string();
        let data = obj.get("data").cloned().unwrap_or(Value::Null);

        let body = match op.as_str() {
            "message.created" => EventBody::MessageCreated(
                serde_json::from_value(data).map_err(|e| DeError::custom(format!("bad message.created data: {e}")))?,
            ),
            "account.created" => EventBody::AccountCreated(
                serde_json::from_value(data).map_err(|e| DeError::custom(format!("bad account.created data: {e}")))?,
            ),
            "thread.created" => EventBody::ThreadCreated(
                serde_json::from_value(data).map_err(|e| DeError::custom(format!("bad thread.created data: {e}")))?,
            ),
            other => EventBody::Unknown { op: other.to_string(), data },
        };

        Ok(Event { ts, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_kind_round_trips_through_json() {
        for kind in [
            MessageKind::Email,
            MessageKind::Sms,
            MessageKind::Signal,
            MessageKind::WhatsApp,
            MessageKind::Discord,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            let parsed: MessageKind = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn message_kind_serializes_as_small_integer() {
        assert_eq!(serde_json::to_string(&MessageKind::Discord).unwrap(), "4");
    }

    #[test]
    fn event_round_trips_through_json_line() {
        let ts = Utc::now();
        let ev = Event::message_created(ts, "msg_abc");
        let line = serde_json::to_string(&ev).unwrap();
        let parsed: Event = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.body.op(), "message.created");
        match parsed.body {
            EventBody::MessageCreated(d) => assert_eq!(d.id, "msg_abc"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn event_tolerates_unknown_op_and_extra_keys() {
        let line = r#"{"ts":"2026-01-01T00:00:00Z","op":"message.deleted","data":{"id":"x"},"extra":"ignored"}"#;
        let ev: Event = serde_json::from_str(line).unwrap();
        assert_eq!(ev.body.op(), "message.deleted");
        assert!(matches!(ev.body, EventBody::Unknown { .. }));
    }

    #[test]
    fn message_tag_lookup() {
        let msg = Message {
            id: "msg_x".into(),
            kind: MessageKind::Sms,
            account_id: "a".into(),
            author: AuthorRef::default(),
            created_at: 1,
            imported_at: 2,
            content: "hi".into(),
            title: None,
            visibility: None,
            refs: MessageRefs::default(),
            source: SourceRef { platform: Platform::Sms, ..Default::default() },
            tags: vec![(tag_keys::DIRECTION.to_string(), DIRECTION_INCOMING.to_string())],
        };
        assert_eq!(msg.tag(tag_keys::DIRECTION), Some(DIRECTION_INCOMING));
        assert_eq!(msg.tag("missing"), None);
    }
}
