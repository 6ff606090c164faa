//! Typed identifier wrappers.
//!
//! All identifiers are opaque strings. Typed wrappers exist so the compiler
//! stops you from passing an `EventId` where a `SessionId` is expected —
//! the protocol does not care what the strings look like, and callers are
//! free to hand in non-UUID values (useful in tests and replays).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh, random identifier (UUIDv4).
            #[must_use]
            pub fn new_random() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Create an identifier from anything that converts to `String`.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(EventId, "Unique identifier for a single event.");
typed_id!(SessionId, "Unique identifier for a session (one workflow run).");
typed_id!(
    RecordingHash,
    "Content hash of a normalized provider request, used as the recording cache key."
);
typed_id!(NodeId, "Identifier of a node within a workflow DAG (e.g. a foreach/loop container).");
