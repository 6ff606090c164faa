//! The session-level run loop: feed input, repeatedly pick and
//! activate an agent against the freshly derived state, until the
//! workflow's termination predicate holds or no agent matches.
//!
//! A top-level "node" is, in this runtime, one agent activation: the
//! driver brackets each with `node:started`/
//! `node:completed`/`node:error`, `node_id` set to the agent's name and
//! `node_index` a running activation counter. This is what lets
//! [`chronicle_deriver::container::derive_container_state`]'s
//! `current_node_id`/`current_node_index` tracking mean something for a
//! reactive, agent-scheduled workflow rather than a compiled node
//! sequence — see `DESIGN.md`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chronicle_hub::{EventHub, HubRegistry};
use chronicle_store::EventLog;
use chronicle_types::{Event, EventDraft, SerializedEvent, SessionId, SessionState, WorkflowDef};
use serde_json::json;

use crate::config::Config;
use crate::error::EngineError;
use crate::scheduler::{self, ActivationError, ActivationOutcome, ProviderMap};

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome<S> {
    /// The termination predicate held, or no agent matched the last event.
    Completed {
        /// The session that just finished.
        session_id: SessionId,
        /// Final derived state.
        state: S,
    },
    /// The hub paused mid-activation (or mid-container); resumable via
    /// [`ExecutionDriver::resume`].
    Paused(SessionState),
}

/// Owns the top-level loop for one workflow definition, wired to a shared
/// store/hub registry and provider map.
pub struct ExecutionDriver {
    store: Arc<dyn EventLog>,
    registry: Arc<HubRegistry>,
    providers: ProviderMap,
    config: Config,
}

impl ExecutionDriver {
    /// Build a driver sharing `store` with `registry` (the registry must
    /// have been constructed from the same `store`, so hub checkpoints and
    /// driver reads agree on the durable log).
    pub fn new(store: Arc<dyn EventLog>, registry: Arc<HubRegistry>, providers: ProviderMap, config: Config) -> Self {
        Self {
            store,
            registry,
            providers,
            config,
        }
    }

    /// Start a fresh session for `workflow`, seeded with `input` as a
    /// `user:input` event.
    pub async fn start<S>(&self, workflow: &WorkflowDef<S>, input: impl Into<String>) -> Result<RunOutcome<S>, EngineError>
    where
        S: Clone + Send + Sync,
    {
        let session_id = SessionId::new_random();
        let hub = self.registry.create_hub(session_id.clone(), workflow.name.clone());

        hub.emit(EventDraft::new(chronicle_types::event::exec_event::FLOW_STARTED))
            .await?;
        hub.emit(EventDraft::with_payload("user:input", json!({ "text": input.into() })))
            .await?;

        self.drive(workflow, &hub, &session_id, 0).await
    }

    /// Resume a previously paused session: consumes its stashed
    /// [`SessionState`], replays `message` in as a `user:input` event if
    /// given, and continues the loop from where it left off.
    pub async fn resume<S>(
        &self,
        workflow: &WorkflowDef<S>,
        session_id: SessionId,
        message: Option<String>,
    ) -> Result<RunOutcome<S>, EngineError>
    where
        S: Clone + Send + Sync,
    {
        let paused = self.registry.resume(&session_id, message).await?;
        let hub = self.registry.create_hub(session_id.clone(), workflow.name.clone());

        let persisted = self.load_domain_events(&session_id).await?;
        hub.seed_exec_log(persisted.clone());

        for pending in &paused.pending_messages {
            hub.emit(EventDraft::with_payload("user:input", json!({ "text": pending })))
                .await?;
        }

        self.drive(workflow, &hub, &session_id, paused.current_node_index).await
    }

    async fn drive<S>(
        &self,
        workflow: &WorkflowDef<S>,
        hub: &EventHub,
        session_id: &SessionId,
        mut node_index: u32,
    ) -> Result<RunOutcome<S>, EngineError>
    where
        S: Clone + Send + Sync,
    {
        let task_timeout = Duration::from_millis(self.config.task_timeout_ms);

        loop {
            let events = self.load_domain_events(session_id).await?;
            let state = chronicle_deriver::derive_state(&workflow.handlers, workflow.initial_state.clone(), &events);

            if (workflow.until)(&state) {
                break;
            }

            // The last *domain* event, not the last event overall —
            // `node:*`/`flow:*` bookkeeping the driver itself just emitted
            // must not shadow the event an agent actually reacts to.
            let Some(trigger_event) = events
                .iter()
                .rev()
                .find(|e| !chronicle_types::event::exec_event::is_execution_event(&e.name))
            else {
                break;
            };

            let Some(agent) = scheduler::pick(trigger_event, &state, &workflow.agents) else {
                break;
            };

            hub.emit(EventDraft::with_payload(
                chronicle_types::event::exec_event::NODE_STARTED,
                json!({ "node_id": agent.name, "node_index": node_index }),
            ))
            .await?;

            let trigger_event = trigger_event.clone();
            match scheduler::activate(
                hub,
                &self.providers,
                agent,
                &state,
                &trigger_event,
                &self.config.retry,
                task_timeout,
            )
            .await
            {
                Ok(ActivationOutcome::Completed) => {
                    hub.emit(EventDraft::with_payload(
                        chronicle_types::event::exec_event::NODE_COMPLETED,
                        json!({ "node_id": agent.name, "output": serde_json::Value::Null }),
                    ))
                    .await?;
                    node_index += 1;
                }
                Err(ActivationError::Paused(pause)) => {
                    self.registry.retire_hub(session_id);
                    return Ok(RunOutcome::Paused(pause.state));
                }
                Err(ActivationError::Failed(error)) => {
                    hub.emit(EventDraft::with_payload(
                        chronicle_types::event::exec_event::NODE_ERROR,
                        json!({ "node_id": agent.name, "message": error.to_string() }),
                    ))
                    .await?;
                    self.registry.retire_hub(session_id);
                    return Err(error);
                }
            }
        }

        hub.emit(EventDraft::new(chronicle_types::event::exec_event::FLOW_COMPLETED))
            .await?;
        let events = self.load_domain_events(session_id).await?;
        let state = chronicle_deriver::derive_state(&workflow.handlers, workflow.initial_state.clone(), &events);
        self.registry.retire_hub(session_id);

        Ok(RunOutcome::Completed {
            session_id: session_id.clone(),
            state,
        })
    }

    async fn load_domain_events(&self, session_id: &SessionId) -> Result<Vec<Event>, EngineError> {
        let serialized = self.store.get_events(session_id).await?;
        decode_all(serialized)
    }
}

fn decode_all(serialized: Vec<SerializedEvent>) -> Result<Vec<Event>, EngineError> {
    let mut events = Vec::with_capacity(serialized.len());
    for s in serialized {
        let event_id = s.id.clone();
        let event = s
            .into_event()
            .map_err(|error| chronicle_store::StoreError::read(format!("decoding event `{event_id}`"), error))?;
        events.push(event);
    }
    Ok(events)
}
