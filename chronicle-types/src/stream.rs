//! Normalized streaming events produced by an agent's underlying LLM call.
//!
//! Every provider the engine talks to (Anthropic, OpenAI, Ollama, a replayed
//! recording) is squeezed into this one shape before the scheduler ever sees
//! it. The scheduler's job is then provider-agnostic: fold
//! [`AgentStreamEvent`]s into domain events per a fixed mapping table,
//! without caring which SDK produced them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token accounting for a single agent activation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens generated.
    pub output_tokens: u64,
    /// Tokens read from a provider-side cache, if supported.
    pub cache_read_tokens: Option<u64>,
    /// Tokens written to a provider-side cache, if supported.
    pub cache_creation_tokens: Option<u64>,
}

impl TokenUsage {
    /// Sum of input and output tokens, ignoring cache accounting.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Combine two usage records, as when an activation spans several
    /// provider calls (e.g. a retried request).
    #[must_use]
    pub fn merged_with(&self, other: &TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
            cache_read_tokens: add_opt(self.cache_read_tokens, other.cache_read_tokens),
            cache_creation_tokens: add_opt(self.cache_creation_tokens, other.cache_creation_tokens),
        }
    }
}

fn add_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
    }
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model reached a natural stopping point.
    EndTurn,
    /// The model invoked a tool and is waiting on its result.
    ToolUse,
    /// The model hit `max_tokens`.
    MaxTokens,
    /// Output was filtered by a content policy.
    ContentFilter,
}

/// Error surfaced mid-stream or from a failed provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamError {
    /// Human-readable error message.
    pub message: String,
    /// Whether the execution driver should retry this activation
    /// rather than surface `error:occurred`.
    pub is_retryable: bool,
}

impl StreamError {
    /// Construct a non-retryable stream error.
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: false,
        }
    }

    /// Construct a retryable stream error.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: true,
        }
    }
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StreamError {}

/// The terminal record of a provider turn: final text, structured output
/// (if the agent declared an `outputSchema`), stop reason, and usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRunResult {
    /// The agent's final assembled text output, if any.
    pub text: Option<String>,
    /// Structured output, present once validated against the agent's
    /// `output_schema`.
    pub structured_output: Option<Value>,
    /// Why the provider stopped. `None` only for synthetic/error results.
    pub stop_reason: Option<StopReason>,
    /// Token accounting for this activation.
    pub usage: TokenUsage,
}

/// One normalized, provider-agnostic event within a turn. Carries a
/// monotonic `seq` so recordings can be replayed in exact original order
/// even if the underlying transport (e.g. SSE) doesn't itself guarantee it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStreamEvent {
    /// Monotonic index within the turn, starting at 0.
    pub seq: u64,
    /// The event payload.
    pub kind: AgentStreamEventKind,
}

impl AgentStreamEvent {
    /// Construct an event at a given sequence position.
    pub fn new(seq: u64, kind: AgentStreamEventKind) -> Self {
        Self { seq, kind }
    }

    /// Whether this is the turn-terminating event. Exactly one of these
    /// appears per turn, last.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, AgentStreamEventKind::Result(_))
    }
}

/// The variant set of [`AgentStreamEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentStreamEventKind {
    /// The provider has accepted the turn and assigned it an id.
    SessionInit {
        /// Provider-assigned identifier for this turn.
        provider_session_id: String,
    },
    /// Incremental assistant text.
    TextDelta(String),
    /// The assistant's text block has finished; carries the full text.
    TextComplete(String),
    /// Incremental reasoning/thinking content.
    ThinkingDelta(String),
    /// The assistant's thinking block has finished; carries the full text.
    ThinkingComplete(String),
    /// The model invoked a tool.
    ToolCall {
        /// Tool call identifier.
        id: String,
        /// Tool name as declared in the agent's tool registry.
        name: String,
        /// Tool input, assembled from the model's (possibly incremental)
        /// JSON arguments.
        input: Value,
    },
    /// A tool call's result became available.
    ToolResult {
        /// Tool call identifier (matches `ToolCall.id`).
        id: String,
        /// The tool's output payload.
        output: Value,
    },
    /// Token usage statistics for the turn so far.
    Usage(TokenUsage),
    /// The provider is about to stop generating.
    Stop(StopReason),
    /// Terminal event: exactly one per turn, always last.
    Result(AgentRunResult),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_merges_cache_fields_as_additive() {
        let a = TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            cache_read_tokens: Some(2),
            cache_creation_tokens: None,
        };
        let b = TokenUsage {
            input_tokens: 3,
            output_tokens: 1,
            cache_read_tokens: None,
            cache_creation_tokens: Some(4),
        };
        let merged = a.merged_with(&b);
        assert_eq!(merged.input_tokens, 13);
        assert_eq!(merged.output_tokens, 6);
        assert_eq!(merged.cache_read_tokens, Some(2));
        assert_eq!(merged.cache_creation_tokens, Some(4));
    }

    #[test]
    fn usage_total_ignores_cache() {
        let usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            cache_read_tokens: Some(100),
            cache_creation_tokens: Some(100),
        };
        assert_eq!(usage.total(), 15);
    }

    #[test]
    fn only_result_is_terminal() {
        let delta = AgentStreamEvent::new(0, AgentStreamEventKind::TextDelta("hi".into()));
        let result = AgentStreamEvent::new(1, AgentStreamEventKind::Result(AgentRunResult::default()));
        assert!(!delta.is_terminal());
        assert!(result.is_terminal());
    }
}
