//! Event log and recording store persistence for the chronicle runtime.
//!
//! Two independent stores, each with a SQLite-backed implementation and an
//! in-memory implementation for tests:
//!
//! - [`EventLog`] / [`SqliteEventLog`] / [`InMemoryEventLog`] — the
//!   per-session, append-only event log.
//! - [`RecordingStore`] / [`SqliteRecordingStore`] / [`InMemoryRecordingStore`]
//!   — the content-addressed cache of provider turns.

mod error;
mod event_log;
mod recording_store;
mod schema;

pub use error::StoreError;
pub use event_log::{EventLog, InMemoryEventLog, SqliteEventLog};
pub use recording_store::{InMemoryRecordingStore, RecordingId, RecordingStore, SqliteRecordingStore};
pub use schema::{init_schema, SCHEMA_VERSION};
