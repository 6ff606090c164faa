//! Saved positions inside `foreach`/`loop` nodes, and the paused-session
//! snapshot they compose into.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{NodeId, SessionId};

/// One completed iteration of a container node, retained so a checkpoint
/// mid-container can be resumed without re-running earlier iterations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedIteration {
    /// Zero-based iteration index.
    pub index: u32,
    /// The item this iteration ran over (absent for `loop`, which has no
    /// per-iteration item).
    pub item: Option<Value>,
    /// Each child node's output, keyed by child node id.
    pub outputs: BTreeMap<NodeId, Value>,
}

/// A saved position within a single `foreach`/`loop` node. A paused
/// session's `container_stack` holds one of these per nesting level,
/// outermost first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerFrame {
    /// The container node this frame belongs to.
    pub node_id: NodeId,
    /// Index of the iteration in progress (or about to start).
    pub iteration_index: u32,
    /// Known collection length for `foreach`; absent for `loop`, whose
    /// length is not known up front.
    pub total_iterations: Option<u32>,
    /// The current iteration's item, for `foreach`.
    pub current_item: Option<Value>,
    /// Index of the next child to run within the current iteration's body.
    pub child_index: u32,
    /// Iterations that fully completed before the checkpoint.
    pub completed_iterations: Vec<CompletedIteration>,
    /// Outputs produced by children that finished within the
    /// *in-progress* iteration, keyed by child node id. Cleared each time
    /// an iteration completes and folds into `completed_iterations`.
    pub partial_child_outputs: BTreeMap<NodeId, Value>,
}

impl ContainerFrame {
    /// A fresh frame for a container about to run its first iteration.
    pub fn new(node_id: NodeId, total_iterations: Option<u32>) -> Self {
        Self {
            node_id,
            iteration_index: 0,
            total_iterations,
            current_item: None,
            child_index: 0,
            completed_iterations: Vec::new(),
            partial_child_outputs: BTreeMap::new(),
        }
    }
}

/// A paused session's full execution position, derivable from the
/// `ExecutionEvent` subsequence of the log alone and
/// sufficient for the driver to resume exactly where it left off.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    /// The paused session.
    pub session_id: SessionId,
    /// Name of the workflow being run.
    pub workflow_name: String,
    /// The top-level node the session was at when paused.
    pub current_node_id: Option<NodeId>,
    /// Index of `current_node_id` within the workflow's top-level sequence.
    pub current_node_index: u32,
    /// Outputs of completed top-level nodes, keyed by node id.
    pub outputs: BTreeMap<NodeId, Value>,
    /// Messages queued by `resume(sessionId, message)` calls that arrived
    /// before the driver picked them up as injected events.
    pub pending_messages: Vec<String>,
    /// When the checkpoint that produced this snapshot ran.
    pub paused_at: DateTime<Utc>,
    /// Nested container positions, outermost first. Empty means paused
    /// between top-level nodes, not inside any container.
    pub container_stack: Vec<ContainerFrame>,
}

impl SessionState {
    /// Whether this snapshot represents a pause between top-level nodes
    /// rather than inside a `foreach`/`loop`.
    #[must_use]
    pub fn is_between_top_level_nodes(&self) -> bool {
        self.container_stack.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_frame_starts_at_zero() {
        let frame = ContainerFrame::new(NodeId::new("loop1"), Some(5));
        assert_eq!(frame.iteration_index, 0);
        assert_eq!(frame.child_index, 0);
        assert!(frame.completed_iterations.is_empty());
    }

    #[test]
    fn empty_stack_means_between_top_level_nodes() {
        let state = SessionState {
            session_id: SessionId::new("s1"),
            workflow_name: "wf".into(),
            current_node_id: Some(NodeId::new("n2")),
            current_node_index: 1,
            outputs: BTreeMap::new(),
            pending_messages: Vec::new(),
            paused_at: Utc::now(),
            container_stack: Vec::new(),
        };
        assert!(state.is_between_top_level_nodes());
    }
}
