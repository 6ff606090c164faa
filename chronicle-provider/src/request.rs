//! The request shape passed to [`crate::Provider::query`].

use chronicle_types::{JsonSchema, PromptTemplate, SessionId};
use tokio_util::sync::CancellationToken;

/// `"bypassPermissions" | "askUser"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMode {
    /// Tool calls execute without prompting.
    BypassPermissions,
    /// Tool calls pause for external approval.
    AskUser,
}

impl PermissionMode {
    /// Stable string form, used as hash input and for logging.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::BypassPermissions => "bypassPermissions",
            PermissionMode::AskUser => "askUser",
        }
    }
}

/// One turn request to a provider: the prompt to send, the structured-output
/// schema it must conform to, and the knobs that affect generation (and
/// therefore participate in the recording hash).
#[derive(Debug, Clone)]
pub struct ProviderQuery {
    /// The prompt assembled by `agent.prompt(state, trigger_event)`.
    pub prompt: PromptTemplate,
    /// The session this turn belongs to, for logging/tracing only — never
    /// part of the recording hash.
    pub session_id: Option<SessionId>,
    /// Model identifier override. `None` defers to the provider's default.
    pub model: Option<String>,
    /// Cap on internal provider-side turns (e.g. tool-use round trips)
    /// within this single activation.
    pub max_turns: Option<usize>,
    /// Permission posture for tool calls this turn may make.
    pub permission_mode: PermissionMode,
    /// Schema the terminal `result` event's structured output must satisfy.
    pub output_schema: JsonSchema,
    /// Cancels the stream at its next suspension point. Not part of the recording hash.
    pub abort_signal: CancellationToken,
}

impl ProviderQuery {
    /// Build the common case: a prompt, an output schema, a fresh
    /// (never-cancelled) abort signal, and sensible defaults for everything
    /// else.
    pub fn new(prompt: PromptTemplate, output_schema: JsonSchema) -> Self {
        Self {
            prompt,
            session_id: None,
            model: None,
            max_turns: None,
            permission_mode: PermissionMode::BypassPermissions,
            output_schema,
            abort_signal: CancellationToken::new(),
        }
    }
}
