use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chronicle_store::EventLog;
use chronicle_types::{
    event::exec_event, Event, EventDraft, NodeId, SerializedEvent, SessionId, SessionState,
};
use chrono::Utc;
use futures::Stream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::PauseError;
use crate::pattern;

type Observer = Arc<dyn Fn(&Event) + Send + Sync>;

/// The single emission point for one running session.
///
/// Owned by exactly one driver for the lifetime of a run. `emit` fans out
/// to the durable event log, to live subscribers (best-effort, never
/// blocking), and to registered observer callbacks (exceptions isolated).
/// Execution events are additionally folded into an in-memory log used by
/// [`EventHub::checkpoint`] to derive a resumable snapshot without
/// re-reading the durable store.
pub struct EventHub {
    session_id: SessionId,
    workflow_name: String,
    store: Arc<dyn EventLog>,
    exec_log: Mutex<Vec<Event>>,
    broadcast_tx: broadcast::Sender<Event>,
    observers: RwLock<Vec<(u64, Observer)>>,
    next_observer_id: std::sync::atomic::AtomicU64,
    abort: CancellationToken,
    resumable: AtomicBool,
    paused: Arc<Mutex<std::collections::HashMap<SessionId, SessionState>>>,
}

impl EventHub {
    /// Construct a hub for `session_id`, sharing `paused` with whatever
    /// other session-scoped hubs the enclosing registry manages (so a
    /// checkpoint derived here is visible to a later `resume`).
    pub fn new(
        session_id: SessionId,
        workflow_name: impl Into<String>,
        store: Arc<dyn EventLog>,
        paused: Arc<Mutex<std::collections::HashMap<SessionId, SessionState>>>,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            session_id,
            workflow_name: workflow_name.into(),
            store,
            exec_log: Mutex::new(Vec::new()),
            broadcast_tx,
            observers: RwLock::new(Vec::new()),
            next_observer_id: std::sync::atomic::AtomicU64::new(1),
            abort: CancellationToken::new(),
            resumable: AtomicBool::new(true),
            paused,
        }
    }

    /// Seed the in-memory execution log from a previously persisted run —
    /// called when resuming, so `checkpoint` can derive state that accounts
    /// for execution events recorded before the pause.
    pub fn seed_exec_log(&self, events: Vec<Event>) {
        let mut log = self.exec_log.lock().expect("exec log mutex poisoned");
        *log = events.into_iter().filter(|e| exec_event::is_execution_event(&e.name)).collect();
    }

    /// The session this hub emits on behalf of.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The abort signal activations should pass through to the provider and
    /// to `executeChild`/container suspension points.
    #[must_use]
    pub fn abort_signal(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Cancel the session's abort signal. `resumable = false` means the
    /// next `checkpoint()` should NOT derive and stash a pause snapshot —
    /// the cancellation is a hard stop, not a pause, and the driver fails
    /// the session through the ordinary cancellation path instead.
    pub fn request_abort(&self, resumable: bool) {
        self.resumable.store(resumable, Ordering::SeqCst);
        self.abort.cancel();
    }

    /// Assign id/timestamp, fold execution events into `_eventLog`, and fan
    /// out to the durable store, live subscribers, and observers. Store
    /// failures propagate;
    /// subscriber/observer failures are caught, logged, and never
    /// propagate.
    pub async fn emit(&self, draft: EventDraft) -> Result<Event, chronicle_store::StoreError> {
        let event = Event::from_draft(draft, chronicle_types::EventId::new_random(), Utc::now());

        if exec_event::is_execution_event(&event.name) {
            self.exec_log.lock().expect("exec log mutex poisoned").push(event.clone());
        }

        self.store
            .append(&self.session_id, SerializedEvent::from_event(&event, 0))
            .await?;

        // Best-effort fanout: a lagging or absent subscriber must never
        // block emission.
        let _ = self.broadcast_tx.send(event.clone());

        let observers = self.observers.read().expect("observers lock poisoned");
        for (_, observer) in observers.iter() {
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| observer(&event))) {
                tracing::error!(?panic, event_name = %event.name, "observer callback panicked, isolating");
            }
        }

        Ok(event)
    }

    /// Same contract as [`EventHub::emit`], for events arriving from
    /// outside the driver loop. Failures are silently absorbed rather than propagated —
    /// at-most-once delivery, no backpressure to the external caller.
    pub async fn publish(&self, draft: EventDraft) {
        if let Err(error) = self.emit(draft).await {
            tracing::warn!(%error, "publish: event dropped");
        }
    }

    /// Subscribe to events whose name matches `pattern` (exact, `*`, or a
    /// single leading/trailing wildcard). The returned stream is lazy and
    /// effectively infinite until the hub (and its broadcast sender) is
    /// dropped; dropping the stream unsubscribes.
    pub fn subscribe(&self, pattern: impl Into<String>) -> Pin<Box<dyn Stream<Item = Event> + Send>> {
        let pattern = pattern.into();
        let mut rx = self.broadcast_tx.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if pattern::matches(&pattern, &event.name) {
                            yield event;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscriber lagged; dropping skipped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Register an observer callback, invoked synchronously on every
    /// `emit`/`publish`. Returns a handle for [`EventHub::unobserve`].
    pub fn observe(&self, callback: impl Fn(&Event) + Send + Sync + 'static) -> u64 {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .write()
            .expect("observers lock poisoned")
            .push((id, Arc::new(callback)));
        id
    }

    /// Unregister a previously-registered observer.
    pub fn unobserve(&self, id: u64) {
        self.observers
            .write()
            .expect("observers lock poisoned")
            .retain(|(oid, _)| *oid != id);
    }

    /// The in-memory `ExecutionEvent` log, for debugging/replay.
    #[must_use]
    pub fn get_event_log(&self) -> Vec<Event> {
        self.exec_log.lock().expect("exec log mutex poisoned").clone()
    }

    /// Clear the in-memory `ExecutionEvent` log on a fresh start. Does not touch the durable store.
    pub fn clear_event_log(&self) {
        self.exec_log.lock().expect("exec log mutex poisoned").clear();
    }

    /// If the abort signal has fired and the abort was resumable, derive a
    /// [`SessionState`] from the execution log, stash it keyed by session
    /// id, emit `flow:paused`, and return the corresponding [`PauseError`].
    /// Otherwise a no-op. Containers call this before each iteration and
    /// before each child execution.
    pub async fn checkpoint(&self) -> Result<(), PauseError> {
        if !self.abort.is_cancelled() || !self.resumable.load(Ordering::SeqCst) {
            return Ok(());
        }

        let state = self.derive_paused_state();
        self.paused
            .lock()
            .expect("paused sessions map poisoned")
            .insert(self.session_id.clone(), state.clone());

        if let Err(error) = self.emit(EventDraft::new(exec_event::FLOW_PAUSED)).await {
            tracing::error!(%error, "failed to persist flow:paused, pause snapshot stashed regardless");
        }

        Err(PauseError { state })
    }

    fn derive_paused_state(&self) -> SessionState {
        let events = self.exec_log.lock().expect("exec log mutex poisoned").clone();
        let derived = chronicle_deriver::container::derive_container_state(&events);

        let current_node_id: Option<NodeId> = derived
            .container_stack
            .first()
            .map(|frame| frame.node_id.clone())
            .or(derived.current_node_id);

        SessionState {
            session_id: self.session_id.clone(),
            workflow_name: self.workflow_name.clone(),
            current_node_id,
            current_node_index: derived.current_node_index,
            outputs: derived.outputs,
            pending_messages: Vec::new(),
            paused_at: Utc::now(),
            container_stack: derived.container_stack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_store::InMemoryEventLog;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    fn hub() -> EventHub {
        EventHub::new(
            SessionId::new("s1"),
            "wf",
            Arc::new(InMemoryEventLog::new()),
            Arc::new(Mutex::new(HashMap::new())),
        )
    }

    #[tokio::test]
    async fn emit_assigns_id_and_timestamp() {
        let hub = hub();
        let event = hub.emit(EventDraft::new("user:input")).await.unwrap();
        assert_eq!(event.name, "user:input");
    }

    #[tokio::test]
    async fn execution_events_are_folded_into_exec_log() {
        let hub = hub();
        hub.emit(EventDraft::new("user:input")).await.unwrap();
        hub.emit(EventDraft::new(exec_event::FLOW_STARTED)).await.unwrap();
        assert_eq!(hub.get_event_log().len(), 1);
    }

    #[tokio::test]
    async fn clear_event_log_empties_it() {
        let hub = hub();
        hub.emit(EventDraft::new(exec_event::FLOW_STARTED)).await.unwrap();
        hub.clear_event_log();
        assert!(hub.get_event_log().is_empty());
    }

    #[tokio::test]
    async fn subscriber_receives_matching_events_only() {
        let hub = hub();
        let mut stream = hub.subscribe("tool:*");
        hub.emit(EventDraft::new("tool:called")).await.unwrap();
        hub.emit(EventDraft::new("text:delta")).await.unwrap();

        use futures::StreamExt;
        let received = stream.next().await.unwrap();
        assert_eq!(received.name, "tool:called");
    }

    #[tokio::test]
    async fn observer_panic_is_isolated() {
        let hub = hub();
        let called = Arc::new(AtomicUsize::new(0));
        let c = called.clone();
        hub.observe(move |_event| {
            c.fetch_add(1, Ordering::SeqCst);
            panic!("boom");
        });
        // Should not propagate the panic nor abort the emit.
        let result = hub.emit(EventDraft::new("user:input")).await;
        assert!(result.is_ok());
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn checkpoint_is_a_no_op_when_not_aborted() {
        let hub = hub();
        assert!(hub.checkpoint().await.is_ok());
    }

    #[tokio::test]
    async fn checkpoint_pauses_and_derives_state_when_aborted() {
        let hub = hub();
        hub.emit(EventDraft::with_payload(
            exec_event::NODE_STARTED,
            serde_json::json!({"node_id": "n1", "node_index": 0}),
        ))
        .await
        .unwrap();
        hub.request_abort(true);

        let err = hub.checkpoint().await.unwrap_err();
        assert_eq!(err.state.current_node_id, Some(NodeId::new("n1")));
        assert_eq!(err.state.session_id, SessionId::new("s1"));
    }

    #[tokio::test]
    async fn non_resumable_abort_does_not_pause() {
        let hub = hub();
        hub.request_abort(false);
        assert!(hub.checkpoint().await.is_ok());
    }

    #[tokio::test]
    async fn unobserve_stops_delivery() {
        let hub = hub();
        let called = Arc::new(AtomicUsize::new(0));
        let c = called.clone();
        let id = hub.observe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        hub.unobserve(id);
        hub.emit(EventDraft::new("user:input")).await.unwrap();
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }
}
