//! Recording cache entries: the content-addressed provider turns a
//! `RecordingStore` persists in live mode and a playback provider reads
//! back in replay mode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::RecordingHash;
use crate::stream::{AgentRunResult, AgentStreamEvent};

/// A cached provider turn, keyed by [`RecordingHash`].
///
/// The hash is computed over `{normalizedPrompt, providerId, options,
/// outputSchema}` with timestamps, session ids, and `causedBy` links
/// stripped out first — two requests
/// that are identical but for those fields must hash identically, or
/// replay across sessions would never hit cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordingEntry {
    /// Content hash of the normalized request.
    pub hash: RecordingHash,
    /// The post-template prompt text that produced this turn.
    pub prompt: String,
    /// Provider identifier (e.g. `"anthropic"`, `"openai"`).
    pub provider: String,
    /// The normalized stream this turn produced, in order, including the
    /// terminal `Result` event.
    pub stream_data: Vec<AgentStreamEvent>,
    /// The terminal result. `None` while `status` is `InProgress`.
    pub result: Option<AgentRunResult>,
    /// Lifecycle state of this entry.
    pub status: RecordingStatus,
    /// When recording of this turn began.
    pub created_at: DateTime<Utc>,
    /// When recording finished, if it has.
    pub completed_at: Option<DateTime<Utc>>,
}

impl RecordingEntry {
    /// Start a fresh, empty in-progress entry for incremental capture via
    /// `start_recording`.
    pub fn start(hash: RecordingHash, prompt: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            hash,
            prompt: prompt.into(),
            provider: provider.into(),
            stream_data: Vec::new(),
            result: None,
            status: RecordingStatus::InProgress,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Append one captured stream event to an in-progress entry.
    pub fn push_event(&mut self, event: AgentStreamEvent) {
        self.stream_data.push(event);
    }

    /// Mark this entry complete with its terminal result.
    pub fn finalize(&mut self, result: AgentRunResult) {
        self.result = Some(result);
        self.status = RecordingStatus::Complete;
        self.completed_at = Some(Utc::now());
    }

    /// Whether this entry can be served to a playback provider as-is.
    #[must_use]
    pub fn is_replayable(&self) -> bool {
        matches!(self.status, RecordingStatus::Complete) && self.result.is_some()
    }
}

/// Lifecycle state of a [`RecordingEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    /// The live call is still streaming; rows accumulate via `appendEvent`.
    /// In-progress entries are garbage-collectible.
    InProgress,
    /// The live call finished and the full stream plus result were captured.
    Complete,
}

/// Summary row returned by `list()`: `{hash, prompt, provider,
/// recordedAt}`, `complete` entries only, ordered by `completed_at DESC`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordingMeta {
    /// Content hash of the normalized request.
    pub hash: RecordingHash,
    /// The post-template prompt text.
    pub prompt: String,
    /// Provider identifier.
    pub provider: String,
    /// When the entry completed.
    pub recorded_at: DateTime<Utc>,
}
