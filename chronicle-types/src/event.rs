//! The [`Event`] entity: an immutable fact appended to a session's log.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::EventId;

/// An immutable fact. Once stored, an event is never mutated or reordered.
///
/// `payload` is an arbitrary JSON object. We keep it as `serde_json::Value`
/// rather than a generic `T` because the engine
/// treats event payloads as an open, heterogeneous extension point — the
/// deriver dispatches on `name`, not on a Rust type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Unique identifier for this event.
    pub id: EventId,
    /// Hierarchical `category:action` name, e.g. `user:input`, `text:delta`.
    pub name: String,
    /// Arbitrary JSON payload.
    pub payload: Value,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// The event that caused this one, if any. Always earlier in the same
    /// session's log (invariant enforced by the hub, not by this type).
    pub caused_by: Option<EventId>,
}

impl Event {
    /// Construct an event with an explicit id and timestamp. Prefer
    /// [`EventDraft`] + [`crate::event::Event::from_draft`] when emitting
    /// through the hub, which assigns both for you.
    pub fn new(
        id: EventId,
        name: impl Into<String>,
        payload: Value,
        timestamp: DateTime<Utc>,
        caused_by: Option<EventId>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            payload,
            timestamp,
            caused_by,
        }
    }

    /// Assemble an `Event` from a not-yet-persisted [`EventDraft`].
    #[must_use]
    pub fn from_draft(draft: EventDraft, id: EventId, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            payload: draft.payload,
            timestamp,
            caused_by: draft.caused_by,
        }
    }

    /// Convenience accessor into the payload as an object map, if it is one.
    #[must_use]
    pub fn payload_object(&self) -> Option<&serde_json::Map<String, Value>> {
        self.payload.as_object()
    }
}

/// A not-yet-persisted event: what a handler or agent produces. The hub
/// assigns `id` and `timestamp` at emission time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventDraft {
    /// Hierarchical `category:action` name.
    pub name: String,
    /// Arbitrary JSON payload.
    pub payload: Value,
    /// The event that caused this one, if any.
    pub caused_by: Option<EventId>,
}

impl EventDraft {
    /// Create a draft with no payload and no causal parent.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Value::Object(Default::default()),
            caused_by: None,
        }
    }

    /// Create a draft with a JSON payload.
    pub fn with_payload(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            caused_by: None,
        }
    }

    /// Set the causal parent.
    #[must_use]
    pub fn caused_by(mut self, parent: EventId) -> Self {
        self.caused_by = Some(parent);
        self
    }
}

/// The on-disk form of an [`Event`]: timestamp as epoch-millis, payload as
/// a JSON string, plus the storage-assigned `position`. `UNIQUE(session_id,
/// position)` is enforced by the store, not by this type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerializedEvent {
    /// Unique identifier for this event.
    pub id: EventId,
    /// Zero-based, gap-free, per-session ordering position.
    pub position: i64,
    /// Hierarchical `category:action` name.
    pub name: String,
    /// JSON payload, pre-serialized (so stores that keep it as `TEXT` don't
    /// need to round-trip through `Value` on every read).
    pub payload_json: String,
    /// Epoch milliseconds.
    pub timestamp_ms: i64,
    /// Causal parent, if any.
    pub caused_by: Option<EventId>,
}

impl SerializedEvent {
    /// Serialize a live [`Event`] at the given log position.
    pub fn from_event(event: &Event, position: i64) -> Self {
        Self {
            id: event.id.clone(),
            position,
            name: event.name.clone(),
            payload_json: event.payload.to_string(),
            timestamp_ms: event.timestamp.timestamp_millis(),
            caused_by: event.caused_by.clone(),
        }
    }

    /// Deserialize back into a live [`Event`], dropping the storage-only
    /// `position` field. Returns `Err` on malformed JSON — callers must
    /// surface this as a `StoreError::Read`, never drop it silently.
    pub fn into_event(self) -> Result<Event, serde_json::Error> {
        let payload: Value = serde_json::from_str(&self.payload_json)?;
        let timestamp = Utc
            .timestamp_millis_opt(self.timestamp_ms)
            .single()
            .unwrap_or_else(Utc::now);
        Ok(Event {
            id: self.id,
            name: self.name,
            payload,
            timestamp,
            caused_by: self.caused_by,
        })
    }
}

/// Names and payload shapes for the driver's introspection events. These
/// are events like any other — they
/// flow through the same hub, the same log, the same deriver — but they are
/// additionally folded into the in-memory `_eventLog` the hub keeps for
/// fast state derivation, and the deriver gives them special container-
/// stack handling (see `chronicle_deriver::container`).
pub mod exec_event {
    /// Prefix shared by every execution event name, used by
    /// [`is_execution_event`] to recognize the reserved set.
    pub const FLOW_STARTED: &str = "flow:started";
    /// Session ended via the termination predicate.
    pub const FLOW_COMPLETED: &str = "flow:completed";
    /// Session paused via `hub.abort({resumable: true})`.
    pub const FLOW_PAUSED: &str = "flow:paused";
    /// Session resumed via `hub.resume(...)`.
    pub const FLOW_RESUMED: &str = "flow:resumed";
    /// A top-level DAG node started.
    pub const NODE_STARTED: &str = "node:started";
    /// A top-level DAG node completed.
    pub const NODE_COMPLETED: &str = "node:completed";
    /// A top-level DAG node errored.
    pub const NODE_ERROR: &str = "node:error";
    /// A `foreach`/`loop` iteration started.
    pub const CONTAINER_ITERATION_STARTED: &str = "container:iterationStarted";
    /// A `foreach`/`loop` iteration completed.
    pub const CONTAINER_ITERATION_COMPLETED: &str = "container:iterationCompleted";
    /// A container's child node started.
    pub const CONTAINER_CHILD_STARTED: &str = "container:childStarted";
    /// A container's child node completed.
    pub const CONTAINER_CHILD_COMPLETED: &str = "container:childCompleted";
    /// Observability-only loop-edge marker.
    pub const LOOP_ITERATE: &str = "loop:iterate";

    const ALL: &[&str] = &[
        FLOW_STARTED,
        FLOW_COMPLETED,
        FLOW_PAUSED,
        FLOW_RESUMED,
        NODE_STARTED,
        NODE_COMPLETED,
        NODE_ERROR,
        CONTAINER_ITERATION_STARTED,
        CONTAINER_ITERATION_COMPLETED,
        CONTAINER_CHILD_STARTED,
        CONTAINER_CHILD_COMPLETED,
        LOOP_ITERATE,
    ];

    /// Whether `name` is one of the reserved `ExecutionEvent` names.
    #[must_use]
    pub fn is_execution_event(name: &str) -> bool {
        ALL.contains(&name)
    }

    use crate::id::NodeId;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    /// Payload of a [`NODE_STARTED`] event.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct NodeStartedPayload {
        /// The node that started.
        pub node_id: NodeId,
        /// Its index within the workflow's top-level sequence.
        pub node_index: u32,
    }

    /// Payload of a [`NODE_COMPLETED`] event.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct NodeCompletedPayload {
        /// The node that completed.
        pub node_id: NodeId,
        /// Its output.
        pub output: Value,
    }

    /// Payload of a [`CONTAINER_ITERATION_STARTED`] event.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ContainerIterationStartedPayload {
        /// The container node this iteration belongs to.
        pub node_id: NodeId,
        /// Zero-based iteration index.
        pub iteration_index: u32,
        /// The item this iteration runs over, for `foreach`. Absent for `loop`.
        pub item: Option<Value>,
        /// Known collection length, for `foreach`. Absent for `loop`.
        pub total_iterations: Option<u32>,
    }

    /// Payload of a [`CONTAINER_CHILD_STARTED`] event.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ContainerChildStartedPayload {
        /// The container node.
        pub node_id: NodeId,
        /// The child node that started.
        pub child_id: NodeId,
        /// Its index within the container body.
        pub child_index: u32,
    }

    /// Payload of a [`CONTAINER_CHILD_COMPLETED`] event.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ContainerChildCompletedPayload {
        /// The container node.
        pub node_id: NodeId,
        /// The child node that completed.
        pub child_id: NodeId,
        /// The child's output.
        pub output: Value,
    }

    /// Payload of a [`CONTAINER_ITERATION_COMPLETED`] event.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ContainerIterationCompletedPayload {
        /// The container node.
        pub node_id: NodeId,
        /// The iteration that completed.
        pub iteration_index: u32,
        /// Each child's output, keyed by child node id.
        pub outputs: std::collections::BTreeMap<NodeId, Value>,
    }

    /// Payload of a [`LOOP_ITERATE`] event.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LoopIteratePayload {
        /// The loop node jumping back.
        pub node_id: NodeId,
    }
}

/// A totally ordered, gap-free run of positions `0..len`. Used by stores and
/// the deriver to assert the no-gaps invariant in tests.
#[must_use]
pub fn positions_are_gap_free(events: &[SerializedEvent]) -> bool {
    let mut seen: BTreeMap<i64, ()> = BTreeMap::new();
    for e in events {
        if seen.insert(e.position, ()).is_some() {
            return false; // duplicate position
        }
    }
    seen.keys().copied().eq(0..events.len() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evt(pos: i64) -> SerializedEvent {
        SerializedEvent {
            id: EventId::new_random(),
            position: pos,
            name: "user:input".into(),
            payload_json: "{}".into(),
            timestamp_ms: 0,
            caused_by: None,
        }
    }

    #[test]
    fn gap_free_detects_gaps() {
        assert!(positions_are_gap_free(&[evt(0), evt(1), evt(2)]));
        assert!(!positions_are_gap_free(&[evt(0), evt(2)]));
        assert!(!positions_are_gap_free(&[evt(0), evt(0)]));
        assert!(positions_are_gap_free(&[]));
    }

    #[test]
    fn serialized_round_trip() {
        let event = Event::new(
            EventId::new("e1"),
            "user:input",
            serde_json::json!({"text": "hi"}),
            Utc::now(),
            None,
        );
        let ser = SerializedEvent::from_event(&event, 0);
        let back = ser.into_event().unwrap();
        assert_eq!(back.name, event.name);
        assert_eq!(back.payload, event.payload);
    }

    #[test]
    fn malformed_payload_surfaces_error_not_panic() {
        let mut ser = SerializedEvent::from_event(
            &Event::new(EventId::new("e1"), "x", serde_json::json!({}), Utc::now(), None),
            0,
        );
        ser.payload_json = "{not json".into();
        assert!(ser.into_event().is_err());
    }
}
