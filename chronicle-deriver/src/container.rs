//! Derivation of the paused-session snapshot from the `ExecutionEvent`
//! subsequence of a session's log.

use std::collections::BTreeMap;

use chronicle_types::event::exec_event;
use chronicle_types::{
    CompletedIteration, ContainerFrame, Event, NodeId,
};

/// The top-level derivation state folded from `ExecutionEvent`s: current
/// position in the workflow DAG, completed top-level outputs, and the
/// nested container stack — everything a paused [`chronicle_types::SessionState`]
/// needs besides session/workflow identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerDerivation {
    /// The top-level node most recently started, if any.
    pub current_node_id: Option<NodeId>,
    /// Its index within the workflow's top-level sequence.
    pub current_node_index: u32,
    /// Outputs of completed top-level nodes, keyed by node id.
    pub outputs: BTreeMap<NodeId, serde_json::Value>,
    /// Nested container positions, outermost first.
    pub container_stack: Vec<ContainerFrame>,
}

/// Fold the `ExecutionEvent` subsequence of `events` into a
/// [`ContainerDerivation`], applying these rules:
///
/// - `node:started` sets `current_node_index`.
/// - `node:completed` records the output, advances the index, and clears
///   the container stack (a top-level node finished; any container state
///   is stale).
/// - `container:iterationStarted` pushes a new frame for `node_id` if none
///   exists yet, else updates the most recently pushed frame with that
///   `node_id` ("last-match-wins", so recursive/re-entrant containers work).
/// - `container:childStarted` updates that frame's `child_index`.
/// - `container:childCompleted` records the output in
///   `partial_child_outputs`, and removes any nested frame for `child_id`
///   (that nested container completed).
/// - `container:iterationCompleted` appends to `completed_iterations` and
///   resets `partial_child_outputs`.
/// - `loop:iterate` does not modify the stack.
///
/// Non-`ExecutionEvent`s are ignored. Malformed execution-event payloads
/// are skipped (logged) rather than panicking — a derivation must never
/// crash on a log that was otherwise valid.
#[must_use]
pub fn derive_container_state(events: &[Event]) -> ContainerDerivation {
    let mut derivation = ContainerDerivation::default();

    for event in events {
        match event.name.as_str() {
            exec_event::NODE_STARTED => {
                let Some(payload) = decode::<exec_event::NodeStartedPayload>(event) else {
                    continue;
                };
                derivation.current_node_id = Some(payload.node_id);
                derivation.current_node_index = payload.node_index;
            }
            exec_event::NODE_COMPLETED => {
                let Some(payload) = decode::<exec_event::NodeCompletedPayload>(event) else {
                    continue;
                };
                derivation.outputs.insert(payload.node_id, payload.output);
                derivation.current_node_index += 1;
                derivation.container_stack.clear();
            }
            exec_event::CONTAINER_ITERATION_STARTED => {
                let Some(payload) = decode::<exec_event::ContainerIterationStartedPayload>(event) else {
                    continue;
                };
                match last_frame_mut(&mut derivation.container_stack, &payload.node_id) {
                    Some(frame) => {
                        frame.iteration_index = payload.iteration_index;
                        frame.current_item = payload.item;
                        frame.total_iterations = payload.total_iterations.or(frame.total_iterations);
                        frame.child_index = 0;
                        frame.partial_child_outputs.clear();
                    }
                    None => {
                        let mut frame = ContainerFrame::new(payload.node_id.clone(), payload.total_iterations);
                        frame.iteration_index = payload.iteration_index;
                        frame.current_item = payload.item;
                        derivation.container_stack.push(frame);
                    }
                }
            }
            exec_event::CONTAINER_CHILD_STARTED => {
                let Some(payload) = decode::<exec_event::ContainerChildStartedPayload>(event) else {
                    continue;
                };
                if let Some(frame) = last_frame_mut(&mut derivation.container_stack, &payload.node_id) {
                    frame.child_index = payload.child_index;
                }
            }
            exec_event::CONTAINER_CHILD_COMPLETED => {
                let Some(payload) = decode::<exec_event::ContainerChildCompletedPayload>(event) else {
                    continue;
                };
                if let Some(frame) = last_frame_mut(&mut derivation.container_stack, &payload.node_id) {
                    frame
                        .partial_child_outputs
                        .insert(payload.child_id.clone(), payload.output);
                }
                derivation
                    .container_stack
                    .retain(|f| f.node_id != payload.child_id);
            }
            exec_event::CONTAINER_ITERATION_COMPLETED => {
                let Some(payload) = decode::<exec_event::ContainerIterationCompletedPayload>(event) else {
                    continue;
                };
                if let Some(frame) = last_frame_mut(&mut derivation.container_stack, &payload.node_id) {
                    frame.completed_iterations.push(CompletedIteration {
                        index: payload.iteration_index,
                        item: frame.current_item.clone(),
                        outputs: payload.outputs,
                    });
                    frame.partial_child_outputs.clear();
                }
            }
            exec_event::LOOP_ITERATE => {
                // Observability-only; the stack is unaffected.
            }
            _ => {}
        }
    }

    derivation
}

/// Most-recently-pushed frame matching `node_id`, for "last-match-wins"
/// re-entrant container semantics.
fn last_frame_mut<'a>(stack: &'a mut [ContainerFrame], node_id: &NodeId) -> Option<&'a mut ContainerFrame> {
    stack.iter_mut().rev().find(|f| &f.node_id == node_id)
}

fn decode<T: serde::de::DeserializeOwned>(event: &Event) -> Option<T> {
    match serde_json::from_value(event.payload.clone()) {
        Ok(payload) => Some(payload),
        Err(error) => {
            tracing::warn!(event_name = %event.name, %error, "skipping execution event with malformed payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_types::EventId;
    use chrono::Utc;
    use serde_json::json;

    fn exec_event_at(name: &str, payload: serde_json::Value) -> Event {
        Event::new(EventId::new_random(), name, payload, Utc::now(), None)
    }

    #[test]
    fn node_completed_clears_container_stack() {
        let events = vec![
            exec_event_at(
                exec_event::CONTAINER_ITERATION_STARTED,
                json!({"node_id": "loop1", "iteration_index": 0, "item": null, "total_iterations": 3}),
            ),
            exec_event_at(
                exec_event::NODE_COMPLETED,
                json!({"node_id": "n1", "output": {}}),
            ),
        ];
        let derived = derive_container_state(&events);
        assert!(derived.container_stack.is_empty());
        assert_eq!(derived.current_node_index, 1);
    }

    #[test]
    fn iteration_started_then_checkpoint_preserves_in_progress_index() {
        // container:iterationStarted is recorded BEFORE the pause, so a
        // derivation mid-iteration 2 sees index 2, not 1.
        let events = vec![
            exec_event_at(
                exec_event::CONTAINER_ITERATION_STARTED,
                json!({"node_id": "loop1", "iteration_index": 0, "item": "a", "total_iterations": 5}),
            ),
            exec_event_at(
                exec_event::CONTAINER_ITERATION_COMPLETED,
                json!({"node_id": "loop1", "iteration_index": 0, "outputs": {}}),
            ),
            exec_event_at(
                exec_event::CONTAINER_ITERATION_STARTED,
                json!({"node_id": "loop1", "iteration_index": 1, "item": "b", "total_iterations": 5}),
            ),
            exec_event_at(
                exec_event::CONTAINER_ITERATION_COMPLETED,
                json!({"node_id": "loop1", "iteration_index": 1, "outputs": {}}),
            ),
            exec_event_at(
                exec_event::CONTAINER_ITERATION_STARTED,
                json!({"node_id": "loop1", "iteration_index": 2, "item": "c", "total_iterations": 5}),
            ),
        ];
        let derived = derive_container_state(&events);
        assert_eq!(derived.container_stack.len(), 1);
        let frame = &derived.container_stack[0];
        assert_eq!(frame.iteration_index, 2);
        assert_eq!(frame.completed_iterations.len(), 2);
    }

    #[test]
    fn child_completed_removes_nested_frame() {
        let events = vec![
            exec_event_at(
                exec_event::CONTAINER_ITERATION_STARTED,
                json!({"node_id": "outer", "iteration_index": 0, "item": null, "total_iterations": null}),
            ),
            exec_event_at(
                exec_event::CONTAINER_ITERATION_STARTED,
                json!({"node_id": "inner", "iteration_index": 0, "item": null, "total_iterations": null}),
            ),
            exec_event_at(
                exec_event::CONTAINER_CHILD_COMPLETED,
                json!({"node_id": "outer", "child_id": "inner", "output": {}}),
            ),
        ];
        let derived = derive_container_state(&events);
        assert_eq!(derived.container_stack.len(), 1);
        assert_eq!(derived.container_stack[0].node_id, NodeId::new("outer"));
    }

    #[test]
    fn malformed_payload_is_skipped_not_fatal() {
        let events = vec![exec_event_at(exec_event::NODE_STARTED, json!("not an object"))];
        let derived = derive_container_state(&events);
        assert!(derived.current_node_id.is_none());
    }

    #[test]
    fn re_entrant_container_uses_last_match() {
        let events = vec![
            exec_event_at(
                exec_event::CONTAINER_ITERATION_STARTED,
                json!({"node_id": "loop1", "iteration_index": 0, "item": null, "total_iterations": null}),
            ),
            exec_event_at(
                exec_event::CONTAINER_CHILD_COMPLETED,
                json!({"node_id": "loop1", "child_id": "recurse", "output": {}}),
            ),
            exec_event_at(
                exec_event::CONTAINER_ITERATION_STARTED,
                json!({"node_id": "loop1", "iteration_index": 1, "item": null, "total_iterations": null}),
            ),
        ];
        let derived = derive_container_state(&events);
        assert_eq!(derived.container_stack.len(), 1);
        assert_eq!(derived.container_stack[0].iteration_index, 1);
    }
}
