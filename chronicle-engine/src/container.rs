//! Checkpoint-enabled nested iteration: `foreach` and `loop` container
//! nodes, with pause/resume at iteration and child granularity.
//!
//! This module is parameterized over an [`ChildExecutor`] the embedding
//! driver supplies, rather than owning a DAG/node-compiler itself — container
//! scopes are machinery for pause/resume inside nested iterative constructs,
//! not a planner. [`run_foreach`]/[`run_loop`] emit iteration-started, then
//! call `checkpoint()`, so a pause always lands with the in-progress
//! iteration visible to the deriver.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chronicle_hub::EventHub;
use chronicle_types::event::exec_event;
use chronicle_types::{CompletedIteration, ContainerFrame, EventDraft, NodeId};
use serde_json::Value;

use crate::error::ContainerError;

/// What a container node calls to run one child in its body. The embedding
/// driver implements this — typically "derive state, pick+activate an
/// agent for this child, or recurse into a nested container".
#[async_trait]
pub trait ChildExecutor: Send + Sync {
    /// Run `child_id` for the current iteration's `item` (absent for
    /// `loop`), honoring `resume_stack` if this child is itself a
    /// container being resumed mid-run.
    async fn execute_child(
        &self,
        child_id: &NodeId,
        item: Option<&Value>,
        resume_stack: &[ContainerFrame],
    ) -> Result<Value, ContainerError>;
}

/// Run a `foreach` node over `items`, with body `body`. `resume_stack[0]`, if its `node_id` matches
/// `node_id`, seeds the resumed position; the rest of `resume_stack` is
/// passed down to the first resumed child (`resumeStack.slice(1)`).
///
/// Empty `items` short-circuits without emitting any events (spec: "Empty
/// array short-circuits without emitting events").
pub async fn run_foreach(
    hub: &EventHub,
    node_id: &NodeId,
    items: &[Value],
    body: &[NodeId],
    executor: &dyn ChildExecutor,
    resume_stack: &[ContainerFrame],
) -> Result<Vec<CompletedIteration>, ContainerError> {
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let resume_frame = resume_stack.first().filter(|f| f.node_id == *node_id).cloned();
    let total = items.len() as u32;
    let start = resume_frame.as_ref().map_or(0, |f| f.iteration_index.min(total));
    let mut iterations: Vec<CompletedIteration> = resume_frame
        .as_ref()
        .map(|f| f.completed_iterations.clone())
        .unwrap_or_default();

    for i in start..total {
        let item = &items[i as usize];
        let is_resumed_iteration = i == start && resume_frame.is_some();

        hub.emit(EventDraft::with_payload(
            exec_event::CONTAINER_ITERATION_STARTED,
            serde_json::json!({
                "node_id": node_id,
                "iteration_index": i,
                "item": item,
                "total_iterations": total,
            }),
        ))
        .await?;
        hub.checkpoint().await?;

        let outputs = run_body(
            hub,
            node_id,
            body,
            Some(item),
            executor,
            if is_resumed_iteration { resume_frame.as_ref() } else { None },
            if is_resumed_iteration { &resume_stack[1..] } else { &[] },
        )
        .await?;

        hub.emit(EventDraft::with_payload(
            exec_event::CONTAINER_ITERATION_COMPLETED,
            serde_json::json!({ "node_id": node_id, "iteration_index": i, "outputs": outputs }),
        ))
        .await?;

        iterations.push(CompletedIteration {
            index: i,
            item: Some(item.clone()),
            outputs,
        });
    }

    Ok(iterations)
}

/// Run a `loop` node: same iteration/child/checkpoint shape as `foreach`,
/// but with no fixed item collection — `should_continue(iteration_index)`
/// decides whether another pass runs, and each completed pass emits the
/// observability-only `loop:iterate` jump-back edge.
pub async fn run_loop(
    hub: &EventHub,
    node_id: &NodeId,
    body: &[NodeId],
    should_continue: impl Fn(u32) -> bool,
    executor: &dyn ChildExecutor,
    resume_stack: &[ContainerFrame],
) -> Result<Vec<CompletedIteration>, ContainerError> {
    let resume_frame = resume_stack.first().filter(|f| f.node_id == *node_id).cloned();
    let mut iterations: Vec<CompletedIteration> = resume_frame
        .as_ref()
        .map(|f| f.completed_iterations.clone())
        .unwrap_or_default();
    let mut i = resume_frame.as_ref().map_or(0, |f| f.iteration_index);
    let mut first = true;

    while should_continue(i) {
        let is_resumed_iteration = first && resume_frame.is_some();
        first = false;

        hub.emit(EventDraft::with_payload(
            exec_event::CONTAINER_ITERATION_STARTED,
            serde_json::json!({
                "node_id": node_id,
                "iteration_index": i,
                "item": Value::Null,
                "total_iterations": Value::Null,
            }),
        ))
        .await?;
        hub.checkpoint().await?;

        let outputs = run_body(
            hub,
            node_id,
            body,
            None,
            executor,
            if is_resumed_iteration { resume_frame.as_ref() } else { None },
            if is_resumed_iteration { &resume_stack[1..] } else { &[] },
        )
        .await?;

        hub.emit(EventDraft::with_payload(
            exec_event::CONTAINER_ITERATION_COMPLETED,
            serde_json::json!({ "node_id": node_id, "iteration_index": i, "outputs": outputs }),
        ))
        .await?;

        iterations.push(CompletedIteration {
            index: i,
            item: None,
            outputs,
        });

        i += 1;
        hub.emit(EventDraft::with_payload(
            exec_event::LOOP_ITERATE,
            serde_json::json!({ "node_id": node_id }),
        ))
        .await?;
    }

    Ok(iterations)
}

/// Shared child-execution loop for one iteration's body, used by both
/// [`run_foreach`] and [`run_loop`])` loop).
async fn run_body(
    hub: &EventHub,
    node_id: &NodeId,
    body: &[NodeId],
    item: Option<&Value>,
    executor: &dyn ChildExecutor,
    resume_frame: Option<&ContainerFrame>,
    child_resume_stack: &[ContainerFrame],
) -> Result<BTreeMap<NodeId, Value>, ContainerError> {
    let child_start = resume_frame.map_or(0, |f| f.child_index.min(body.len() as u32));
    let mut outputs: BTreeMap<NodeId, Value> = resume_frame
        .map(|f| f.partial_child_outputs.clone())
        .unwrap_or_default();

    for (j, child_id) in body.iter().enumerate().skip(child_start as usize) {
        hub.emit(EventDraft::with_payload(
            exec_event::CONTAINER_CHILD_STARTED,
            serde_json::json!({ "node_id": node_id, "child_id": child_id, "child_index": j as u32 }),
        ))
        .await?;
        hub.checkpoint().await?;

        let output = executor.execute_child(child_id, item, child_resume_stack).await?;
        outputs.insert(child_id.clone(), output.clone());

        hub.emit(EventDraft::with_payload(
            exec_event::CONTAINER_CHILD_COMPLETED,
            serde_json::json!({ "node_id": node_id, "child_id": child_id, "output": output }),
        ))
        .await?;
    }

    Ok(outputs)
}
