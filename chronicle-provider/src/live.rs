//! Live mode: call a real [`Backend`], optionally capturing the turn
//! through a [`chronicle_store::RecordingStore`].

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chronicle_store::RecordingStore;
use chronicle_types::AgentStreamEventKind;
use futures::{Stream, StreamExt};

use crate::error::ProviderError;
use crate::hash::compute_hash;
use crate::request::ProviderQuery;
use crate::{AgentEventStream, Provider};

/// The extension point a concrete vendor integration implements: turn a
/// [`ProviderQuery`] into a raw stream of normalized events. Unlike
/// [`Provider`], a `Backend` has no knowledge of recording — that's
/// [`LiveProvider`]'s job, so every backend gets capture for free.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable identifier for this backend (e.g. `"anthropic"`), used as
    /// hash input and in logs.
    fn backend_id(&self) -> &str;

    /// Issue the turn and return its raw event stream. The stream must
    /// terminate in exactly one `Result` item.
    async fn stream(
        &self,
        query: &ProviderQuery,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<chronicle_types::AgentStreamEvent, ProviderError>> + Send>>, ProviderError>;
}

/// [`Provider`] wrapping a [`Backend`]. When a recording store is attached,
/// every turn is captured incrementally via `start_recording` /
/// `append_event` / `finalize_recording` as it streams, so a crash mid-turn
/// still leaves whatever prefix was captured.
pub struct LiveProvider<B: Backend> {
    backend: B,
    recording_store: Option<Arc<dyn RecordingStore>>,
}

impl<B: Backend> LiveProvider<B> {
    /// A live provider with recording disabled.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            recording_store: None,
        }
    }

    /// A live provider that captures every turn into `store`.
    pub fn with_recording(backend: B, store: Arc<dyn RecordingStore>) -> Self {
        Self {
            backend,
            recording_store: Some(store),
        }
    }
}

#[async_trait]
impl<B: Backend> Provider for LiveProvider<B> {
    fn provider_id(&self) -> &str {
        self.backend.backend_id()
    }

    async fn query(&self, query: ProviderQuery) -> Result<AgentEventStream, ProviderError> {
        let raw = self.backend.stream(&query).await?;

        let Some(store) = self.recording_store.clone() else {
            return Ok(raw);
        };

        let hash = compute_hash(&query, self.backend.backend_id());
        let prompt_text = query
            .prompt
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let provider_id = self.backend.backend_id().to_string();

        let recording_id = store
            .start_recording(&hash, &prompt_text, &provider_id)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "failed to start recording; continuing without capture");
                e
            })
            .ok();

        let captured = async_stream::stream! {
            let mut raw = raw;
            while let Some(item) = raw.next().await {
                if let (Some(id), Ok(event)) = (&recording_id, &item) {
                    if let Err(e) = store.append_event(id, event.clone()).await {
                        tracing::warn!(error = %e, "failed to append recording event; capture is best-effort");
                    }
                }
                if let Ok(event) = &item {
                    if let AgentStreamEventKind::Result(result) = &event.kind {
                        if let Some(id) = &recording_id {
                            if let Err(e) = store.finalize_recording(id, result.clone()).await {
                                tracing::warn!(error = %e, "failed to finalize recording");
                            }
                        }
                    }
                }
                yield item;
            }
        };

        Ok(Box::pin(captured))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_store::InMemoryRecordingStore;
    use chronicle_types::{AgentRunResult, AgentStreamEvent, JsonSchema, PromptTemplate};

    struct EchoBackend;

    #[async_trait]
    impl Backend for EchoBackend {
        fn backend_id(&self) -> &str {
            "echo"
        }

        async fn stream(
            &self,
            _query: &ProviderQuery,
        ) -> Result<Pin<Box<dyn Stream<Item = Result<chronicle_types::AgentStreamEvent, ProviderError>> + Send>>, ProviderError>
        {
            let events = vec![
                Ok(AgentStreamEvent::new(0, AgentStreamEventKind::TextDelta("hi".into()))),
                Ok(AgentStreamEvent::new(
                    1,
                    AgentStreamEventKind::Result(AgentRunResult {
                        text: Some("hi".into()),
                        ..Default::default()
                    }),
                )),
            ];
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    #[tokio::test]
    async fn live_provider_forwards_backend_events() {
        let provider = LiveProvider::new(EchoBackend);
        let query = ProviderQuery::new(PromptTemplate::user("hi"), JsonSchema::object());
        let mut stream = provider.query(query).await.unwrap();
        let mut count = 0;
        while let Some(item) = stream.next().await {
            assert!(item.is_ok());
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn live_provider_captures_turn_when_recording_enabled() {
        let store: Arc<dyn RecordingStore> = Arc::new(InMemoryRecordingStore::new());
        let provider = LiveProvider::with_recording(EchoBackend, store.clone());
        let query = ProviderQuery::new(PromptTemplate::user("hi"), JsonSchema::object());
        let hash = compute_hash(&query, "echo");

        let mut stream = provider.query(query).await.unwrap();
        while stream.next().await.is_some() {}

        let loaded = store.load(&hash).await.unwrap();
        assert!(loaded.is_some(), "turn should have been captured");
        assert_eq!(loaded.unwrap().stream_data.len(), 2);
    }
}
