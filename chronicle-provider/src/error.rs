//! Provider error taxonomy.

use thiserror::Error;

/// Failure from a [`crate::Provider::query`] call.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider rate-limited the request. Retryable.
    #[error("rate limited: {0}")]
    RateLimit(String),
    /// A transient network failure. Retryable.
    #[error("network error: {0}")]
    Network(String),
    /// Playback mode found no recording for the computed hash. Fatal.
    #[error("no recording for hash `{0}`")]
    CacheMiss(chronicle_types::RecordingHash),
    /// The request itself was malformed (a 4xx-equivalent). Fatal.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The activation exceeded its deadline. Fatal, fails fast.
    #[error("activation timed out")]
    Timeout,
    /// The model's structured output failed schema validation.
    #[error("structured output violated schema: {0:?}")]
    SchemaViolation(Vec<chronicle_types::SchemaViolation>),
}

impl ProviderError {
    /// Whether the execution driver should retry this activation with
    /// backoff rather than fail the session outright.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RateLimit(_) | ProviderError::Network(_))
    }

    /// The `error:occurred{code}` value the scheduler stamps on a
    /// fatal activation failure caused by this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            ProviderError::RateLimit(_) => "rate-limit",
            ProviderError::Network(_) => "network",
            ProviderError::CacheMiss(_) => "cache-miss",
            ProviderError::InvalidRequest(_) => "invalid-request",
            ProviderError::Timeout => "timeout",
            ProviderError::SchemaViolation(_) => "schema",
        }
    }
}
