//! Core data model and protocol traits for the chronicle event-sourced
//! agent runtime.
//!
//! This crate has no dependency on any other `chronicle-*` crate — it is
//! the shared vocabulary every other crate builds on: typed ids, the
//! `Event`/`SerializedEvent` pair, the normalized provider stream, the
//! recording cache entry, workflow definitions (handlers and agents), and
//! the container-scope types used by pause/resume.

pub mod container;
pub mod event;
pub mod id;
pub mod recording;
pub mod schema;
pub mod stream;
pub mod workflow;

pub use container::{CompletedIteration, ContainerFrame, SessionState};
pub use event::{
    exec_event, exec_event::{
        ContainerChildCompletedPayload, ContainerChildStartedPayload,
        ContainerIterationCompletedPayload, ContainerIterationStartedPayload, LoopIteratePayload,
        NodeCompletedPayload, NodeStartedPayload,
    },
    Event, EventDraft, SerializedEvent,
};
pub use id::{EventId, NodeId, RecordingHash, SessionId};
pub use recording::{RecordingEntry, RecordingMeta, RecordingStatus};
pub use schema::{JsonSchema, SchemaType, SchemaViolation};
pub use stream::{AgentRunResult, AgentStreamEvent, AgentStreamEventKind, StopReason, StreamError, TokenUsage};
pub use workflow::{
    Agent, FnHandler, Handler, HandlerOutcome, PromptMessage, PromptRole, PromptTemplate,
    WorkflowBuildError, WorkflowBuilder, WorkflowDef,
};
