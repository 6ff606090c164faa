use chronicle_types::{SessionId, SessionState};

/// Raised by [`crate::EventHub::checkpoint`] when the abort signal has
/// fired. Carries the [`SessionState`] derived at the moment of pause, so
/// the driver can surface a pause-result without a second derivation pass.
#[derive(Debug, Clone)]
pub struct PauseError {
    /// The derived snapshot at the point of pause.
    pub state: SessionState,
}

impl std::fmt::Display for PauseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session `{}` paused", self.state.session_id)
    }
}

impl std::error::Error for PauseError {}

/// Raised by [`crate::HubRegistry::resume`] when `session_id` has no paused
/// snapshot on file — either it was never paused, or it's already running.
#[derive(Debug, Clone, thiserror::Error)]
#[error("session `{0}` is not paused")]
pub struct NotPausedError(pub SessionId);
