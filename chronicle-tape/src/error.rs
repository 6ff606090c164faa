//! Errors from assembling a [`crate::Tape`] out of stored events.

use chronicle_types::EventId;

/// Failure decoding a session's durable log into the live [`chronicle_types::Event`]s
/// a [`crate::Tape`] projects over.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum TapeError {
    /// A stored event's JSON payload failed to decode.
    #[error("malformed stored event `{event_id}`: {source}")]
    MalformedEvent {
        /// The offending event's id.
        event_id: EventId,
        /// Underlying decode failure.
        #[source]
        source: serde_json::Error,
    },
}
