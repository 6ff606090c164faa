use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chronicle_store::EventLog;
use chronicle_types::{event::exec_event, EventDraft, SerializedEvent, SessionId, SessionState};
use chrono::Utc;

use crate::error::NotPausedError;
use crate::hub::EventHub;

/// Multi-session facade matching the public `hub.*` surface:
/// `publish`/`abort`/`resume` are called by name with an explicit
/// `SessionId`, dispatching down to whichever [`EventHub`] is currently
/// driving that session. Paused sessions are tracked here too, since a
/// paused session has no live hub to ask.
pub struct HubRegistry {
    store: Arc<dyn EventLog>,
    live: Mutex<HashMap<SessionId, Arc<EventHub>>>,
    paused: Arc<Mutex<HashMap<SessionId, SessionState>>>,
}

impl HubRegistry {
    /// Build a registry backed by `store` for durable event persistence.
    pub fn new(store: Arc<dyn EventLog>) -> Self {
        Self {
            store,
            live: Mutex::new(HashMap::new()),
            paused: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Construct (and register) a fresh hub for `session_id`, sharing this
    /// registry's paused-sessions map so a checkpoint taken here is visible
    /// to a later [`HubRegistry::resume`].
    pub fn create_hub(&self, session_id: SessionId, workflow_name: impl Into<String>) -> Arc<EventHub> {
        let hub = Arc::new(EventHub::new(
            session_id.clone(),
            workflow_name,
            self.store.clone(),
            self.paused.clone(),
        ));
        self.live.lock().expect("live hubs lock poisoned").insert(session_id, hub.clone());
        hub
    }

    /// Drop the live hub for a session that has completed, failed, or
    /// paused. Idempotent.
    pub fn retire_hub(&self, session_id: &SessionId) {
        self.live.lock().expect("live hubs lock poisoned").remove(session_id);
    }

    /// The live hub for `session_id`, if the session is currently running.
    #[must_use]
    pub fn get_hub(&self, session_id: &SessionId) -> Option<Arc<EventHub>> {
        self.live.lock().expect("live hubs lock poisoned").get(session_id).cloned()
    }

    /// Publish an externally-originated event into a running session. A
    /// no-op if the session isn't currently live — failures are silently
    /// absorbed, not surfaced.
    pub async fn publish(&self, session_id: &SessionId, draft: EventDraft) {
        match self.get_hub(session_id) {
            Some(hub) => hub.publish(draft).await,
            None => tracing::debug!(%session_id, "publish: no live session, event dropped"),
        }
    }

    /// Request an abort of `session_id`'s active activation. `resumable`
    /// controls whether the next checkpoint derives and stashes a pause
    /// snapshot, or simply lets cancellation propagate as a hard failure.
    /// A no-op if the session isn't currently live.
    pub fn abort(&self, session_id: &SessionId, resumable: bool) {
        if let Some(hub) = self.get_hub(session_id) {
            hub.request_abort(resumable);
        }
    }

    /// Look up (without removing) the paused snapshot for `session_id`.
    #[must_use]
    pub fn peek_paused(&self, session_id: &SessionId) -> Option<SessionState> {
        self.paused.lock().expect("paused sessions lock poisoned").get(session_id).cloned()
    }

    /// Resume a paused session: removes its stashed [`SessionState`],
    /// appends `message` to `pending_messages`, appends a `flow:resumed`
    /// event directly to the durable log (there is no live hub for a
    /// paused session to emit through), and returns the updated state for
    /// the driver to restart from.
    pub async fn resume(
        &self,
        session_id: &SessionId,
        message: Option<String>,
    ) -> Result<SessionState, NotPausedError> {
        let mut state = self
            .paused
            .lock()
            .expect("paused sessions lock poisoned")
            .remove(session_id)
            .ok_or_else(|| NotPausedError(session_id.clone()))?;

        if let Some(message) = message {
            state.pending_messages.push(message);
        }

        let event = chronicle_types::Event::from_draft(
            EventDraft::new(exec_event::FLOW_RESUMED),
            chronicle_types::EventId::new_random(),
            Utc::now(),
        );
        if let Err(error) = self.store.append(session_id, SerializedEvent::from_event(&event, 0)).await {
            tracing::error!(%error, %session_id, "failed to persist flow:resumed");
        }

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_store::InMemoryEventLog;
    use chronicle_types::event::exec_event as ee;

    #[tokio::test]
    async fn resume_unknown_session_is_not_paused_error() {
        let registry = HubRegistry::new(Arc::new(InMemoryEventLog::new()));
        let result = registry.resume(&SessionId::new("ghost"), None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn checkpoint_then_resume_round_trips_pending_message() {
        let registry = HubRegistry::new(Arc::new(InMemoryEventLog::new()));
        let hub = registry.create_hub(SessionId::new("s1"), "wf");
        hub.emit(EventDraft::with_payload(
            ee::NODE_STARTED,
            serde_json::json!({"node_id": "n1", "node_index": 0}),
        ))
        .await
        .unwrap();
        hub.request_abort(true);
        hub.checkpoint().await.unwrap_err();

        let resumed = registry
            .resume(&SessionId::new("s1"), Some("keep going".into()))
            .await
            .unwrap();
        assert_eq!(resumed.pending_messages, vec!["keep going".to_string()]);

        // Resuming twice fails: the snapshot was consumed.
        assert!(registry.resume(&SessionId::new("s1"), None).await.is_err());
    }

    #[tokio::test]
    async fn publish_to_unknown_session_does_not_panic() {
        let registry = HubRegistry::new(Arc::new(InMemoryEventLog::new()));
        registry.publish(&SessionId::new("ghost"), EventDraft::new("user:input")).await;
    }

    #[tokio::test]
    async fn abort_on_unknown_session_is_a_no_op() {
        let registry = HubRegistry::new(Arc::new(InMemoryEventLog::new()));
        registry.abort(&SessionId::new("ghost"), true);
    }
}
