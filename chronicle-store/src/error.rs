//! Error types for event log and recording store operations.

use chronicle_types::{EventId, SessionId};

/// Failure from an [`crate::EventLog`] or [`crate::RecordingStore`]
/// operation.
///
/// Every variant wraps enough context to log usefully without the caller
/// needing to re-derive what was being attempted. JSON malformation on
/// read is always a [`StoreError::Read`], never silently dropped.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A read (query or deserialize) failed.
    #[error("store read failed: {context}")]
    Read {
        /// What was being read.
        context: String,
        /// Underlying cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A write (insert/update/delete) failed.
    #[error("store write failed: {context}")]
    Write {
        /// What was being written.
        context: String,
        /// Underlying cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A schema migration failed.
    #[error("migration failed: {context}")]
    Migration {
        /// What migration step failed.
        context: String,
        /// Underlying cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// `append` was called with an event id already present in the session.
    #[error("duplicate event id `{event_id}` in session `{session_id}`")]
    DuplicateEventId {
        /// The session the append targeted.
        session_id: SessionId,
        /// The colliding event id.
        event_id: EventId,
    },
    /// A stored payload could not be deserialized back into its domain type.
    #[error("malformed payload for event `{event_id}`: {message}")]
    MalformedPayload {
        /// The offending event's id.
        event_id: EventId,
        /// Description of what was wrong.
        message: String,
    },
}

impl StoreError {
    /// Wrap `source` as a read failure with `context`.
    pub fn read(context: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Read {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Wrap `source` as a write failure with `context`.
    pub fn write(context: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Write {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Wrap `source` as a migration failure with `context`.
    pub fn migration(context: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Migration {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
