//! Playback mode: replay a recorded turn, never touching the network.

use std::sync::Arc;

use async_trait::async_trait;
use chronicle_store::RecordingStore;

use crate::error::ProviderError;
use crate::hash::compute_hash;
use crate::request::ProviderQuery;
use crate::{AgentEventStream, Provider};

/// A [`Provider`] that computes the same hash a [`crate::LiveProvider`]
/// would and replays the stored turn. MUST NOT call any backend SDK — a
/// cache miss is fatal.
pub struct PlaybackProvider {
    provider_id: String,
    store: Arc<dyn RecordingStore>,
}

impl PlaybackProvider {
    /// Replay recordings captured under `provider_id` from `store`.
    pub fn new(provider_id: impl Into<String>, store: Arc<dyn RecordingStore>) -> Self {
        Self {
            provider_id: provider_id.into(),
            store,
        }
    }
}

#[async_trait]
impl Provider for PlaybackProvider {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn query(&self, query: ProviderQuery) -> Result<AgentEventStream, ProviderError> {
        let hash = compute_hash(&query, &self.provider_id);

        let entry = self
            .store
            .load(&hash)
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?
            .ok_or_else(|| ProviderError::CacheMiss(hash.clone()))?;

        let mut events: Vec<Result<chronicle_types::AgentStreamEvent, ProviderError>> =
            entry.stream_data.into_iter().map(Ok).collect();

        if let Some(result) = entry.result {
            let next_seq = events.len() as u64;
            events.push(Ok(chronicle_types::AgentStreamEvent::new(
                next_seq,
                chronicle_types::AgentStreamEventKind::Result(result),
            )));
        }

        Ok(Box::pin(futures::stream::iter(events)))
    }
}
