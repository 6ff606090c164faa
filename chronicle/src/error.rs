//! The one error type [`crate::Chronicle`]'s public methods return,
//! composing every layer's own taxonomy.

/// Everything a [`crate::Chronicle`] call can fail with.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ChronicleError {
    /// The execution engine (scheduler, container scopes, driver) failed.
    #[error(transparent)]
    Engine(#[from] chronicle_engine::EngineError),
    /// The durable event log or recording store failed.
    #[error(transparent)]
    Store(#[from] chronicle_store::StoreError),
    /// A session's stored log couldn't be decoded into a [`chronicle_tape::Tape`].
    #[error(transparent)]
    Tape(#[from] chronicle_tape::TapeError),
    /// `resume`/`load` referenced a session with no matching state.
    #[error("session `{0}` is not known to this runtime")]
    UnknownSession(chronicle_types::SessionId),
}
