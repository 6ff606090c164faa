use chronicle_types::{SchemaViolation, WorkflowBuildError};

/// Structured-output validation failure. Fatal for
/// the activation that produced it; the driver emits `error:occurred{code:
/// "schema"}` and the session fails unless configured to continue.
#[derive(Debug, Clone, thiserror::Error)]
#[error("agent `{agent_name}` output failed schema validation: {violations:?}")]
pub struct SchemaError {
    /// The agent whose structured output was rejected.
    pub agent_name: String,
    /// Every violation found (schema validation collects, not fail-fast).
    pub violations: Vec<SchemaViolation>,
}

/// A workflow's container nodes reference each other in a cycle, detected
/// at definition time rather than discovered mid-run.
#[derive(Debug, Clone, thiserror::Error)]
#[error("cyclic dependency among nodes: {0:?}")]
pub struct CyclicDependencyError(pub Vec<String>);

/// Everything that can end a run other than a pause.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Durable store read/write failed.
    #[error(transparent)]
    Store(#[from] chronicle_store::StoreError),
    /// The provider failed in a way the retry budget couldn't absorb.
    #[error(transparent)]
    Provider(#[from] chronicle_provider::ProviderError),
    /// An agent's structured output didn't conform to its schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// `resume` was called for a session with no paused snapshot.
    #[error(transparent)]
    NotPaused(#[from] chronicle_hub::NotPausedError),
    /// The workflow definition itself was invalid.
    #[error(transparent)]
    WorkflowBuild(#[from] WorkflowBuildError),
    /// A container referenced a dependency cycle.
    #[error(transparent)]
    CyclicDependency(#[from] CyclicDependencyError),
    /// An activation exceeded its deadline.
    #[error("activation `{agent_name}` timed out after {elapsed_ms}ms")]
    Timeout {
        /// The agent whose activation timed out.
        agent_name: String,
        /// How long the activation ran before being cancelled.
        elapsed_ms: u64,
    },
    /// No provider is registered under the key an agent resolved to.
    #[error("no provider registered for model key `{0}`")]
    NoProviderForModel(String),
}

/// Everything that can interrupt a `foreach`/`loop` run. A
/// pause is folded in here too — container code propagates it with `?`
/// exactly like any other failure, and the driver is what distinguishes
/// "paused" from "failed" by matching on [`ContainerError::Paused`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ContainerError {
    /// The hub's abort signal fired mid-iteration or mid-child.
    #[error(transparent)]
    Paused(#[from] chronicle_hub::PauseError),
    /// Durable store read/write failed while emitting a container event.
    #[error(transparent)]
    Store(#[from] chronicle_store::StoreError),
    /// A child node's execution failed.
    #[error("child `{0}` failed: {1}")]
    ChildFailed(chronicle_types::NodeId, String),
}
