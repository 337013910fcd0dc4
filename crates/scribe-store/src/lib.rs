//! Content-addressed, append-only archive and its derived views (spec
//! §4.2–§4.5). Built on top of `scribe-core`'s data model and ID/CID
//! schemes.

pub mod content;
pub mod error;
pub mod eventlog;
pub mod facade;
pub mod views;

pub use error::{Result, StoreError};
pub use facade::{CreateMessageOptions, MessageFilter, MessageStore, NullSearchSink, SearchSink, StoreStats};
