//! Agent activation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chronicle_hub::EventHub;
use chronicle_provider::{Provider, ProviderQuery};
use chronicle_types::{Agent, Event, EventDraft};
use chronicle_types::{AgentStreamEventKind, TokenUsage};
use futures::StreamExt;
use serde_json::json;

use crate::error::{EngineError, SchemaError};
use crate::retry::RetryPolicy;

/// Key a workflow's provider map falls back to when an agent has no
/// explicit `model`.
pub const DEFAULT_PROVIDER_KEY: &str = "default";

/// Providers available to a workflow run, keyed by model/provider key.
pub type ProviderMap = BTreeMap<String, Arc<dyn Provider>>;

/// The outcome of one [`activate`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// The activation ran to completion (whether the agent's own turn
    /// succeeded or failed — that distinction is visible in the emitted
    /// `agent:completed` event, not in this outcome).
    Completed,
}

/// What stopped an activation from completing normally.
#[derive(Debug)]
pub enum ActivationError {
    /// The hub's abort signal fired and checkpoint derived a resumable
    /// snapshot; the caller should surface a pause result.
    Paused(chronicle_hub::PauseError),
    /// Any other failure.
    Failed(EngineError),
}

impl From<EngineError> for ActivationError {
    fn from(error: EngineError) -> Self {
        ActivationError::Failed(error)
    }
}

/// Pick the first agent whose `activates_on` contains `event.name` and
/// whose guard passes against `state`.
#[must_use]
pub fn pick<'a, S>(event: &Event, state: &S, agents: &'a [Agent<S>]) -> Option<&'a Agent<S>> {
    agents
        .iter()
        .find(|agent| agent.activates_on_event(&event.name) && agent.guard_passes(state))
}

/// Translate one normalized stream event into the domain event it maps to
///. `Stop` is observational only and produces nothing;
/// `Result` is handled specially by [`activate`] rather than through this
/// generic mapping, since it also needs schema validation and
/// `agent.on_output`.
#[must_use]
pub fn domain_event_for_stream_kind(kind: &AgentStreamEventKind) -> Option<EventDraft> {
    use AgentStreamEventKind::{
        SessionInit, Stop, TextComplete, TextDelta, ThinkingComplete, ThinkingDelta, ToolCall, ToolResult, Usage,
    };
    match kind {
        SessionInit { provider_session_id } => Some(EventDraft::with_payload(
            "agent:started",
            json!({ "provider_session_id": provider_session_id }),
        )),
        TextDelta(text) => Some(EventDraft::with_payload("text:delta", json!({ "text": text }))),
        TextComplete(text) => Some(EventDraft::with_payload("text:complete", json!({ "text": text }))),
        ThinkingDelta(text) => Some(EventDraft::with_payload("thinking:delta", json!({ "text": text }))),
        ThinkingComplete(text) => Some(EventDraft::with_payload("thinking:complete", json!({ "text": text }))),
        ToolCall { id, name, input } => Some(EventDraft::with_payload(
            "tool:called",
            json!({ "id": id, "name": name, "input": input }),
        )),
        ToolResult { id, output } => Some(EventDraft::with_payload("tool:result", json!({ "id": id, "output": output }))),
        Usage(usage) => Some(EventDraft::with_payload("usage:reported", usage_payload(usage))),
        Stop(_reason) | AgentStreamEventKind::Result(_) => None,
    }
}

fn usage_payload(usage: &TokenUsage) -> serde_json::Value {
    serde_json::to_value(usage).unwrap_or_else(|_| json!({}))
}

/// Run one agent activation end to end:
/// build the prompt, resolve the provider, stream the turn, translate and
/// emit every event, validate structured output, call `agent.on_output`,
/// and emit `agent:completed`. Transient provider errors are retried with
/// backoff; a cancelled abort signal surfaces as [`ActivationError::Paused`]
/// after `hub.checkpoint()` derives the pause snapshot.
pub async fn activate<S>(
    hub: &EventHub,
    providers: &ProviderMap,
    agent: &Agent<S>,
    state: &S,
    trigger_event: &Event,
    retry: &RetryPolicy,
    task_timeout: std::time::Duration,
) -> Result<ActivationOutcome, ActivationError> {
    let prompt = (agent.prompt)(state, trigger_event);
    let provider_key = agent.model.as_deref().unwrap_or(DEFAULT_PROVIDER_KEY);
    let provider = providers
        .get(provider_key)
        .ok_or_else(|| EngineError::NoProviderForModel(provider_key.to_string()))?;

    let started_at = Instant::now();
    let mut attempt = 0u32;

    loop {
        let query = ProviderQuery {
            abort_signal: hub.abort_signal(),
            ..ProviderQuery::new(prompt.clone(), agent.output_schema.clone())
        };

        let stream_result = tokio::time::timeout(task_timeout, provider.query(query)).await;

        let mut stream = match stream_result {
            Err(_elapsed) => {
                hub.emit(EventDraft::with_payload(
                    "error:occurred",
                    json!({ "code": "timeout", "agent_name": agent.name }),
                ))
                .await
                .map_err(EngineError::from)?;
                return Err(EngineError::Timeout {
                    agent_name: agent.name.clone(),
                    elapsed_ms: started_at.elapsed().as_millis() as u64,
                }
                .into());
            }
            Ok(Ok(stream)) => stream,
            Ok(Err(error)) => {
                if error.is_retryable() && retry.allows_attempt(attempt) {
                    tokio::time::sleep(retry.delay_for(attempt)).await;
                    attempt += 1;
                    continue;
                }
                emit_activation_failure(hub, agent, error.error_code(), &error.to_string()).await?;
                return Err(EngineError::from(error).into());
            }
        };

        match run_stream(hub, providers, agent, trigger_event, &mut stream).await? {
            StreamRunOutcome::Completed => return Ok(ActivationOutcome::Completed),
            StreamRunOutcome::Paused(pause) => return Err(ActivationError::Paused(pause)),
            StreamRunOutcome::Retry(error) if retry.allows_attempt(attempt) => {
                tokio::time::sleep(retry.delay_for(attempt)).await;
                attempt += 1;
            }
            StreamRunOutcome::Retry(error) => {
                emit_activation_failure(hub, agent, error.error_code(), &error.to_string()).await?;
                return Err(EngineError::from(error).into());
            }
        }
    }
}

enum StreamRunOutcome {
    Completed,
    Paused(chronicle_hub::PauseError),
    Retry(chronicle_provider::ProviderError),
}

async fn run_stream<S>(
    hub: &EventHub,
    _providers: &ProviderMap,
    agent: &Agent<S>,
    trigger_event: &Event,
    stream: &mut chronicle_provider::AgentEventStream,
) -> Result<StreamRunOutcome, ActivationError> {
    loop {
        if hub.abort_signal().is_cancelled() {
            return match hub.checkpoint().await {
                Ok(()) => Ok(StreamRunOutcome::Completed),
                Err(pause) => Ok(StreamRunOutcome::Paused(pause)),
            };
        }

        let next = tokio::select! {
            biased;
            () = hub.abort_signal().cancelled() => {
                return match hub.checkpoint().await {
                    Ok(()) => Ok(StreamRunOutcome::Completed),
                    Err(pause) => Ok(StreamRunOutcome::Paused(pause)),
                };
            }
            item = stream.next() => item,
        };

        let Some(item) = next else {
            return Ok(StreamRunOutcome::Completed);
        };

        let event = match item {
            Ok(event) => event,
            Err(error) => return Ok(StreamRunOutcome::Retry(error)),
        };

        if let AgentStreamEventKind::Result(result) = &event.kind {
            handle_result(hub, agent, trigger_event, result).await?;
            return Ok(StreamRunOutcome::Completed);
        }

        if let Some(draft) = domain_event_for_stream_kind(&event.kind) {
            hub.emit(draft.caused_by(trigger_event.id.clone()))
                .await
                .map_err(EngineError::from)?;
        }
    }
}

async fn handle_result<S>(
    hub: &EventHub,
    agent: &Agent<S>,
    trigger_event: &Event,
    result: &chronicle_types::AgentRunResult,
) -> Result<(), ActivationError> {
    let Some(structured_output) = &result.structured_output else {
        hub.emit(
            EventDraft::with_payload("agent:completed", json!({ "agent_name": agent.name, "outcome": "success" }))
                .caused_by(trigger_event.id.clone()),
        )
        .await
        .map_err(EngineError::from)?;
        return Ok(());
    };

    let violations = agent.output_schema.validate(structured_output);
    if !violations.is_empty() {
        hub.emit(
            EventDraft::with_payload("error:occurred", json!({ "code": "schema", "agent_name": agent.name }))
                .caused_by(trigger_event.id.clone()),
        )
        .await
        .map_err(EngineError::from)?;
        hub.emit(
            EventDraft::with_payload("agent:completed", json!({ "agent_name": agent.name, "outcome": "failure" }))
                .caused_by(trigger_event.id.clone()),
        )
        .await
        .map_err(EngineError::from)?;
        return Err(EngineError::from(SchemaError {
            agent_name: agent.name.clone(),
            violations,
        })
        .into());
    }

    for draft in (agent.on_output)(structured_output, trigger_event) {
        hub.emit(draft.caused_by(trigger_event.id.clone()))
            .await
            .map_err(EngineError::from)?;
    }

    hub.emit(
        EventDraft::with_payload("agent:completed", json!({ "agent_name": agent.name, "outcome": "success" }))
            .caused_by(trigger_event.id.clone()),
    )
    .await
    .map_err(EngineError::from)?;

    Ok(())
}

async fn emit_activation_failure<S>(
    hub: &EventHub,
    agent: &chronicle_types::Agent<S>,
    code: &str,
    message: &str,
) -> Result<(), ActivationError> {
    hub.emit(EventDraft::with_payload(
        "error:occurred",
        json!({ "code": code, "agent_name": agent.name, "message": message }),
    ))
    .await
    .map_err(EngineError::from)?;
    hub.emit(EventDraft::with_payload(
        "agent:completed",
        json!({ "agent_name": agent.name, "outcome": "failure" }),
    ))
    .await
    .map_err(EngineError::from)?;
    Ok(())
}
