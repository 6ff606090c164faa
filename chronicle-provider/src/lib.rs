//! LLM provider abstraction: the streaming contract every backend satisfies,
//! and its two runtime modes — live (calls the real backend, optionally
//! recording) and playback (replays a recorded turn, never touching the
//! network).
//!
//! What this crate deliberately does NOT do: wrap a specific vendor SDK
//! (Anthropic/OpenAI/Ollama) end to end — that's provider-specific SDK
//! wrapping beyond the contract it must satisfy, explicitly out of scope.
//! [`Backend`] is the extension point a concrete integration
//! implements; this crate supplies the contract, the hashing, the live/
//! playback polymorphism, and the recording capture/replay plumbing around
//! it.

mod error;
mod hash;
mod live;
mod playback;
mod request;

use std::pin::Pin;

use async_trait::async_trait;
use chronicle_types::AgentStreamEvent;
use futures::Stream;

pub use error::ProviderError;
pub use hash::compute_hash;
pub use live::{Backend, LiveProvider};
pub use playback::PlaybackProvider;
pub use request::{PermissionMode, ProviderQuery};

/// A lazy, single-consumer, finite stream of normalized agent events,
/// terminating in exactly one `Result` event. An `Err` item signals a mid-stream failure; the scheduler
/// maps it to `agent:completed{outcome: failure}` + `error:occurred`.
pub type AgentEventStream = Pin<Box<dyn Stream<Item = Result<AgentStreamEvent, ProviderError>> + Send>>;

/// The contract a provider must satisfy. Implementations are
/// polymorphic over mode — [`LiveProvider`] calls a [`Backend`], optionally
/// capturing the turn; [`PlaybackProvider`] only ever reads from a
/// [`chronicle_store::RecordingStore`].
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier used in hashing and logs (e.g. `"anthropic"`).
    fn provider_id(&self) -> &str;

    /// Begin a turn. Returns a stream of normalized events; the caller
    /// drives it to completion (or aborts it) itself.
    async fn query(&self, query: ProviderQuery) -> Result<AgentEventStream, ProviderError>;
}
