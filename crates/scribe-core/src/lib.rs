//! Shared types, ID/CID derivation and config for the ingestion engine.
//!
//! Every other crate in the workspace (`scribe-store`, `scribe-sync` and
//! the five per-platform adapters) depends on this one for the data
//! model and the pure functions that keep IDs deterministic across
//! independent runs and re-imports.

pub mod base58;
pub mod canonical;
pub mod cid;
pub mod config;
pub mod error;
pub mod ids;
pub mod types;

pub use cid::{generate_cid, is_valid_cid, verify_cid, CidInput, CID_PREFIX};
pub use config::ScribeConfig;
pub use error::{IngestError, Result};
pub use types::{
    Account, AccountIdentity, AccountStats, AuthorRef, Event, EventBody, Message, MessageInput,
    MessageKind, MessageRefs, Platform, SourceRef, Thread, ThreadSourceRef, ThreadType,
};
