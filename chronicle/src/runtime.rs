//! [`Chronicle`]: the single handle a host application holds for one
//! workflow definition.

use std::pin::Pin;
use std::sync::Arc;

use chronicle_engine::{Config, EngineError, ExecutionDriver, ProviderMap, RunOutcome as EngineRunOutcome};
use chronicle_hub::HubRegistry;
use chronicle_store::{EventLog, SqliteEventLog};
use chronicle_types::{Event, EventDraft, SerializedEvent, SessionId, SessionState, WorkflowDef};
use chronicle_tape::Tape;
use futures::Stream;

use crate::error::ChronicleError;

/// How a [`Chronicle::run`]/[`Chronicle::resume`] call ended, enriched with
/// the full decoded event log and a ready-to-navigate [`Tape`].
pub enum RunOutcome<S> {
    /// The termination predicate held, or no agent activated for the last
    /// event.
    Completed {
        /// The session that just finished.
        session_id: SessionId,
        /// Final derived state.
        state: S,
        /// The full decoded event log for this session, in position order.
        events: Vec<Event>,
        /// A tape over the same log, rewound to position 0.
        tape: Tape<S>,
    },
    /// The hub paused mid-activation (or mid-container); resumable via
    /// [`Chronicle::resume`].
    Paused(SessionState),
}

/// One workflow definition wired to durable storage, the hub registry, and
/// a provider map, ready to run or resume sessions and hand back navigable
/// tapes.
pub struct Chronicle<S> {
    store: Arc<dyn EventLog>,
    registry: Arc<HubRegistry>,
    driver: ExecutionDriver,
    workflow: WorkflowDef<S>,
}

impl<S> Chronicle<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Open (or create) the store named by `config.database_url`, wire a
    /// hub registry and execution driver around it, and bind `workflow`.
    ///
    /// `config.auto_migrate == false` is honored where supported; SQLite's
    /// migrations are `CREATE TABLE IF NOT EXISTS`-idempotent,
    /// so opening a database that has already been migrated never
    /// re-applies anything regardless of this flag — it exists for
    /// configuration-surface parity and for stores where a genuinely
    /// separate migration step makes sense.
    pub fn new(workflow: WorkflowDef<S>, config: Config, providers: ProviderMap) -> Result<Self, ChronicleError> {
        let store: Arc<dyn EventLog> = if config.database_url == ":memory:" {
            Arc::new(SqliteEventLog::open_in_memory()?)
        } else {
            Arc::new(SqliteEventLog::open(&config.database_url)?)
        };
        Ok(Self::with_store(store, workflow, config, providers))
    }

    /// Same as [`Chronicle::new`], but the caller supplies the store —
    /// useful for tests (`chronicle_store::InMemoryEventLog`) or for
    /// sharing one store across multiple [`Chronicle`] instances.
    pub fn with_store(store: Arc<dyn EventLog>, workflow: WorkflowDef<S>, config: Config, providers: ProviderMap) -> Self {
        let registry = Arc::new(HubRegistry::new(store.clone()));
        let driver = ExecutionDriver::new(store.clone(), registry.clone(), providers, config);
        Self {
            store,
            registry,
            driver,
            workflow,
        }
    }

    /// Start a fresh session, feeding `input` in as the initial `user:input`
    /// event, and drive it to completion or a pause.
    pub async fn run(&self, input: impl Into<String>) -> Result<RunOutcome<S>, ChronicleError> {
        let outcome = self.driver.start(&self.workflow, input).await?;
        self.enrich(outcome).await
    }

    /// Resume a previously paused session, optionally delivering `message`
    /// in as a further `user:input` event, and drive it to completion or
    /// another pause.
    pub async fn resume(&self, session_id: SessionId, message: Option<String>) -> Result<RunOutcome<S>, ChronicleError> {
        let outcome = self.driver.resume(&self.workflow, session_id, message).await?;
        self.enrich(outcome).await
    }

    /// Load a completed (or in-progress) session's durable log into a
    /// [`Tape`], rewound to position 0.
    pub async fn load(&self, session_id: &SessionId) -> Result<Tape<S>, ChronicleError> {
        let serialized = self.store.get_events(session_id).await?;
        Ok(Tape::from_serialized(
            self.workflow.handlers.clone(),
            self.workflow.initial_state.clone(),
            serialized,
        )?)
    }

    /// Publish an externally-originated event into a running session. A
    /// no-op if the session isn't currently live.
    pub async fn publish(&self, session_id: &SessionId, draft: EventDraft) {
        self.registry.publish(session_id, draft).await;
    }

    /// Request an abort of `session_id`'s active activation. `resumable` controls whether the abort derives and
    /// stashes a pause snapshot or is treated as a hard cancellation.
    pub fn abort(&self, session_id: &SessionId, resumable: bool) {
        self.registry.abort(session_id, resumable);
    }

    /// Subscribe to events matching `pattern` on `session_id`'s live hub
    ///. `None` if the session has no live hub
    /// right now (it hasn't started, or has already completed/paused).
    #[must_use]
    pub fn subscribe(&self, session_id: &SessionId, pattern: impl Into<String>) -> Option<Pin<Box<dyn Stream<Item = Event> + Send>>> {
        self.registry.get_hub(session_id).map(|hub| hub.subscribe(pattern))
    }

    /// Release this handle's resources. The durable store and any paused
    /// sessions persist independently of this call — `dispose` only drops
    /// this process's in-memory registry state.
    pub async fn dispose(self) -> Result<(), ChronicleError> {
        Ok(())
    }

    async fn enrich(&self, outcome: EngineRunOutcome<S>) -> Result<RunOutcome<S>, ChronicleError> {
        match outcome {
            EngineRunOutcome::Completed { session_id, state } => {
                let serialized = self.store.get_events(&session_id).await?;
                let events = decode_all(serialized.clone())?;
                let tape = Tape::from_serialized(self.workflow.handlers.clone(), self.workflow.initial_state.clone(), serialized)?;
                Ok(RunOutcome::Completed {
                    session_id,
                    state,
                    events,
                    tape,
                })
            }
            EngineRunOutcome::Paused(state) => Ok(RunOutcome::Paused(state)),
        }
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
