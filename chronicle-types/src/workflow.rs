//! Workflow definitions: the typed state, handlers, and agents an author
//! declares, and the driver executes.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::event::{Event, EventDraft};
use crate::schema::JsonSchema;

/// A pure reducer registered against one event name. Handlers fold an
/// event into the next state and, optionally, produce further events —
/// during live execution those are appended through the hub; during pure
/// [`crate`]-level state derivation they are discarded, since they were
/// already persisted the first time around.
///
/// Handlers are contracted deterministic and side-effect-free. The engine
/// never retries a handler call or runs it speculatively, so a handler
/// that secretly performs I/O breaks replay silently rather than loudly —
/// there is no way for the runtime to detect the violation.
pub trait Handler<S>: Send + Sync {
    /// Fold `event` into `state`, returning the next state and any events
    /// this step wants to additionally emit.
    fn reduce(&self, state: &S, event: &Event) -> HandlerOutcome<S>;
}

/// What a [`Handler`] returns.
pub struct HandlerOutcome<S> {
    /// The state after folding this event.
    pub state: S,
    /// Further events to emit (ignored during pure derivation).
    pub events: Vec<EventDraft>,
}

impl<S> HandlerOutcome<S> {
    /// Advance to `state` without emitting anything further.
    pub fn state_only(state: S) -> Self {
        Self {
            state,
            events: Vec::new(),
        }
    }

    /// Advance to `state` and additionally emit `events`.
    pub fn with_events(state: S, events: Vec<EventDraft>) -> Self {
        Self { state, events }
    }
}

/// Wraps a plain closure as a [`Handler`], so a workflow author can write
/// `handler(|state, event| ...)` instead of naming a struct per event.
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    /// Wrap `f` as a [`Handler`].
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<S, F> Handler<S> for FnHandler<F>
where
    F: Fn(&S, &Event) -> HandlerOutcome<S> + Send + Sync,
{
    fn reduce(&self, state: &S, event: &Event) -> HandlerOutcome<S> {
        (self.f)(state, event)
    }
}

/// One turn of a prompt: a role-tagged message. Kept deliberately plain —
/// multi-modal content blocks belong to the provider SDK wrapper layer,
/// not to the prompt the agent declares.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    /// Who is speaking this turn.
    pub role: PromptRole,
    /// The message text.
    pub content: String,
}

/// Speaker of a [`PromptMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    /// The human/workflow-supplied side of the conversation.
    User,
    /// The model's own prior turns, when an agent re-prompts with history.
    Assistant,
}

/// What `agent.prompt(state, triggerEvent)` produces: the material handed
/// to `provider.query`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptTemplate {
    /// Optional system prompt.
    pub system: Option<String>,
    /// The conversation turns to send.
    pub messages: Vec<PromptMessage>,
}

impl PromptTemplate {
    /// A prompt with a single user message and no system prompt.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            system: None,
            messages: vec![PromptMessage {
                role: PromptRole::User,
                content: text.into(),
            }],
        }
    }

    /// Attach a system prompt.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// A declarative LLM actor: the engine activates it when an incoming event
/// matches `activates_on` and `when` (if present) holds against the current
/// state. `emits` is advisory documentation of what the agent's transform
/// may produce — unlike `activates_on` and `output_schema`, it is not
/// enforced.
pub struct Agent<S> {
    /// Unique name within the workflow.
    pub name: String,
    /// Event names that can trigger this agent.
    pub activates_on: HashSet<String>,
    /// Event names this agent's `on_output` may produce. Advisory only.
    pub emits: HashSet<String>,
    /// Key into the workflow's provider map. `None` resolves to the
    /// provider map's default key.
    pub model: Option<String>,
    /// Builds the prompt to send for a given state and triggering event.
    pub prompt: Arc<dyn Fn(&S, &Event) -> PromptTemplate + Send + Sync>,
    /// Optional guard; the agent only activates if this returns `true` (or
    /// is absent).
    pub when: Option<Arc<dyn Fn(&S) -> bool + Send + Sync>>,
    /// Schema the agent's structured output is enforced against.
    pub output_schema: JsonSchema,
    /// Pure transform from the validated structured output to events to
    /// emit, each stamped with `caused_by = trigger_event.id` by the
    /// scheduler.
    pub on_output: Arc<dyn Fn(&Value, &Event) -> Vec<EventDraft> + Send + Sync>,
}

impl<S> Agent<S> {
    /// Whether `event_name` is in this agent's activation set.
    #[must_use]
    pub fn activates_on_event(&self, event_name: &str) -> bool {
        self.activates_on.contains(event_name)
    }

    /// Evaluate the guard, defaulting to `true` when absent.
    #[must_use]
    pub fn guard_passes(&self, state: &S) -> bool {
        match &self.when {
            Some(guard) => guard(state),
            None => true,
        }
    }
}

/// A complete workflow: typed initial state, the handler registry, the
/// declared agents, and the predicate the driver polls after every fold.
pub struct WorkflowDef<S> {
    /// Workflow-unique name, used in logs and error messages.
    pub name: String,
    /// State before any event has been folded.
    pub initial_state: S,
    /// Reducers keyed by the event name they're registered against.
    pub handlers: BTreeMap<String, Arc<dyn Handler<S>>>,
    /// Agents, in declaration order — the scheduler picks the first whose
    /// `activates_on`/`when` match.
    pub agents: Vec<Agent<S>>,
    /// Evaluated after every state derivation; `true` ends the session.
    pub until: Arc<dyn Fn(&S) -> bool + Send + Sync>,
}

/// Builder for [`WorkflowDef`]. The spec defines the shape of a workflow
/// definition but not how an author assembles one; a builder keeps
/// construction ergonomic without requiring callers to hand-populate the
/// handler map and agent list themselves.
pub struct WorkflowBuilder<S> {
    name: String,
    initial_state: S,
    handlers: BTreeMap<String, Arc<dyn Handler<S>>>,
    agents: Vec<Agent<S>>,
    until: Option<Arc<dyn Fn(&S) -> bool + Send + Sync>>,
}

impl<S> WorkflowBuilder<S>
where
    S: Send + Sync + 'static,
{
    /// Start building a workflow with the given name and initial state.
    pub fn new(name: impl Into<String>, initial_state: S) -> Self {
        Self {
            name: name.into(),
            initial_state,
            handlers: BTreeMap::new(),
            agents: Vec::new(),
            until: None,
        }
    }

    /// Register a handler for `event_name`. Registering a second handler
    /// for the same name replaces the first — last write wins, mirroring
    /// a plain `Map::set`.
    #[must_use]
    pub fn on(mut self, event_name: impl Into<String>, handler: Arc<dyn Handler<S>>) -> Self {
        self.handlers.insert(event_name.into(), handler);
        self
    }

    /// Register an agent. Order is preserved for tie-breaking.
    #[must_use]
    pub fn agent(mut self, agent: Agent<S>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Set the termination predicate.
    #[must_use]
    pub fn until(mut self, predicate: Arc<dyn Fn(&S) -> bool + Send + Sync>) -> Self {
        self.until = Some(predicate);
        self
    }

    /// Finish building. Fails without a termination predicate, or if two
    /// agents share a name — ambiguous activation that should be caught at
    /// definition time rather than discovered mid-run.
    pub fn build(self) -> Result<WorkflowDef<S>, WorkflowBuildError> {
        let until = self.until.ok_or(WorkflowBuildError::NoTerminationPredicate)?;
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.name.clone()) {
                return Err(WorkflowBuildError::DuplicateAgentName(agent.name.clone()));
            }
        }
        Ok(WorkflowDef {
            name: self.name,
            initial_state: self.initial_state,
            handlers: self.handlers,
            agents: self.agents,
            until,
        })
    }
}

/// Errors from [`WorkflowBuilder::build`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum WorkflowBuildError {
    /// No termination predicate was declared via `until`.
    #[error("workflow has no termination predicate")]
    NoTerminationPredicate,
    /// Two agents were registered under the same name.
    #[error("duplicate agent name `{0}`")]
    DuplicateAgentName(String),
}
