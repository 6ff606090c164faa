//! # chronicle — event-sourced, pausable workflow runtime for LLM agents
//!
//! An event log is the source of truth for a session; state is always a
//! pure fold over it. A workflow author declares typed state, a set of
//! pure event handlers, a set of LLM-driven agents triggered by events,
//! and a termination predicate — [`Chronicle`] drives that to completion,
//! feeding input in as events, streaming agent output as finer-grained
//! events, folding everything through the handlers, and halting when the
//! predicate holds. Any point in that history is replayable: state at any
//! position is re-derivable from the log alone, and a session can be
//! paused (mid-`foreach`, mid-`loop`, mid-activation) and resumed later
//! from exactly where it left off.
//!
//! This crate is the single import surface over the workspace's seven
//! `chronicle-*` crates:
//!
//! | crate | responsibility |
//! |---|---|
//! | [`chronicle_types`] | data model — events, ids, workflow/agent/handler shapes |
//! | [`chronicle_store`] | event log + recording store persistence |
//! | [`chronicle_provider`] | LLM provider abstraction, live + playback |
//! | [`chronicle_hub`] | event distribution hub, checkpoint/pause/resume |
//! | [`chronicle_deriver`] | pure state derivation from an event log |
//! | [`chronicle_engine`] | agent scheduler, container scopes, execution driver |
//! | [`chronicle_tape`] | read-only time-travel replay |
//!
//! See `demos/quickstart.rs` for an end-to-end walkthrough.

mod error;
mod runtime;

pub use error::ChronicleError;
pub use runtime::{Chronicle, RunOutcome};

/// Happy-path imports for building and running a workflow.
pub mod prelude {
    pub use crate::{Chronicle, ChronicleError, RunOutcome};

    pub use chronicle_engine::{Config, ConfigBuilder, ProviderMap, ProviderMode, RetryPolicy};
    pub use chronicle_hub::{EventHub, HubRegistry};
    pub use chronicle_provider::{PermissionMode, Provider, ProviderQuery};
    pub use chronicle_store::{EventLog, InMemoryEventLog, RecordingStore, SqliteEventLog};
    pub use chronicle_tape::Tape;
    pub use chronicle_types::{
        Agent, Event, EventDraft, FnHandler, Handler, HandlerOutcome, JsonSchema, PromptTemplate,
        SessionId, SessionState, WorkflowBuilder, WorkflowDef,
    };
}
