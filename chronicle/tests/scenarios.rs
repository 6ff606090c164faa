//! End-to-end runs of the runtime's core guarantees: a full session, a
//! fatal playback miss, time travel over a completed tape, and recovery
//! from a transient provider error.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chronicle::prelude::*;
use chronicle_engine::ProviderMap;
use chronicle_provider::{AgentEventStream, PlaybackProvider, Provider, ProviderError, ProviderQuery};
use chronicle_store::{InMemoryEventLog, InMemoryRecordingStore};
use chronicle_types::{AgentRunResult, AgentStreamEvent, AgentStreamEventKind, StopReason, TokenUsage};
use futures::stream;

#[derive(Debug, Clone, PartialEq)]
struct Msg {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ChatState {
    msgs: Vec<Msg>,
}

fn chat_workflow() -> WorkflowDef<ChatState> {
    let chat = Agent {
        name: "chat".to_string(),
        activates_on: ["user:input".to_string()].into_iter().collect::<HashSet<_>>(),
        emits: ["text:complete".to_string()].into_iter().collect(),
        model: None,
        prompt: Arc::new(|_state, event| {
            let text = event.payload.get("text").and_then(|v| v.as_str()).unwrap_or_default();
            PromptTemplate::user(text)
        }),
        when: None,
        output_schema: JsonSchema::object(),
        on_output: Arc::new(|_output, _trigger| Vec::new()),
    };

    WorkflowBuilder::new("chat-workflow", ChatState::default())
        .on(
            "user:input",
            Arc::new(FnHandler::new(|state: &ChatState, event| {
                let text = event.payload.get("text").and_then(|v| v.as_str()).unwrap_or_default();
                let mut msgs = state.msgs.clone();
                msgs.push(Msg {
                    role: "user",
                    content: text.to_string(),
                });
                HandlerOutcome::state_only(ChatState { msgs })
            })),
        )
        .on(
            "text:complete",
            Arc::new(FnHandler::new(|state: &ChatState, event| {
                let text = event.payload.get("text").and_then(|v| v.as_str()).unwrap_or_default();
                let mut msgs = state.msgs.clone();
                msgs.push(Msg {
                    role: "assistant",
                    content: text.to_string(),
                });
                HandlerOutcome::state_only(ChatState { msgs })
            })),
        )
        .agent(chat)
        .until(Arc::new(|state: &ChatState| state.msgs.len() >= 2))
        .build()
        .expect("chat workflow definition is valid")
}

/// Streams `"Hel"`, `"lo"` as text deltas, then completes with `"Hello"` —
/// the exact shape spec scenario S1 names.
struct ChatProvider;

#[async_trait]
impl Provider for ChatProvider {
    fn provider_id(&self) -> &str {
        "chat-fixture"
    }

    async fn query(&self, _query: ProviderQuery) -> Result<AgentEventStream, ProviderError> {
        let events: Vec<Result<AgentStreamEvent, ProviderError>> = vec![
            Ok(AgentStreamEvent::new(0, AgentStreamEventKind::TextDelta("Hel".into()))),
            Ok(AgentStreamEvent::new(1, AgentStreamEventKind::TextDelta("lo".into()))),
            Ok(AgentStreamEvent::new(2, AgentStreamEventKind::TextComplete("Hello".into()))),
            Ok(AgentStreamEvent::new(
                3,
                AgentStreamEventKind::Result(AgentRunResult {
                    text: Some("Hello".into()),
                    structured_output: None,
                    stop_reason: Some(StopReason::EndTurn),
                    usage: TokenUsage::default(),
                }),
            )),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

fn providers_with(provider: Arc<dyn Provider>) -> ProviderMap {
    let mut providers: ProviderMap = BTreeMap::new();
    providers.insert("default".to_string(), provider);
    providers
}

/// S1 — happy path, single agent: final `msgs` matches the user turn
/// followed by the assistant's completed text, with a gap-free log.
#[tokio::test]
async fn s1_happy_path_single_agent() {
    let store = Arc::new(InMemoryEventLog::new());
    let chronicle = Chronicle::with_store(store, chat_workflow(), Config::default(), providers_with(Arc::new(ChatProvider)));

    let outcome = chronicle.run("Hi").await.expect("run succeeds");
    match outcome {
        RunOutcome::Completed { state, events, .. } => {
            assert_eq!(
                state.msgs,
                vec![
                    Msg { role: "user", content: "Hi".into() },
                    Msg { role: "assistant", content: "Hello".into() },
                ]
            );
            assert_eq!(events.iter().filter(|e| e.name == "user:input").count(), 1);
            assert_eq!(events.last().map(|e| e.name.as_str()), Some("flow:completed"));
        }
        RunOutcome::Paused(_) => panic!("expected completion"),
    }
}

/// S2 — playback cache miss: an empty recording store makes the agent's
/// first activation fatal; the session fails without mutating state
/// beyond the triggering input.
#[tokio::test]
async fn s2_playback_cache_miss_fails_the_session() {
    let store = Arc::new(InMemoryEventLog::new());
    let recordings = Arc::new(InMemoryRecordingStore::new());
    let playback = PlaybackProvider::new("chat-fixture", recordings);
    let chronicle = Chronicle::with_store(
        store,
        chat_workflow(),
        Config::builder().provider_mode(ProviderMode::Playback).build(),
        providers_with(Arc::new(playback)),
    );

    let result = chronicle.run("Hi").await;
    assert!(result.is_err(), "a cache miss must fail the run, not silently complete it");
}

/// S4 — time travel: loading a completed S1 run's tape and stepping to
/// position 1 shows only the user turn; stepping back returns to the
/// empty initial state.
#[tokio::test]
async fn s4_time_travel_over_a_completed_run() {
    let store = Arc::new(InMemoryEventLog::new());
    let chronicle = Chronicle::with_store(
        store,
        chat_workflow(),
        Config::default(),
        providers_with(Arc::new(ChatProvider)),
    );

    let session_id = match chronicle.run("Hi").await.expect("run succeeds") {
        RunOutcome::Completed { session_id, .. } => session_id,
        RunOutcome::Paused(_) => panic!("expected completion"),
    };

    let tape = chronicle.load(&session_id).await.expect("tape loads");
    assert_eq!(tape.state(), ChatState::default());

    let at_one = tape.step_to(1);
    assert_eq!(at_one.state().msgs, vec![Msg { role: "user", content: "Hi".into() }]);

    let back = at_one.step_back();
    assert_eq!(back.state(), ChatState::default());
}

/// Fails its first call with a retryable rate-limit error, then succeeds —
/// spec scenario S5.
struct FlakyProvider {
    calls: AtomicU32,
}

impl FlakyProvider {
    fn new() -> Self {
        Self { calls: AtomicU32::new(0) }
    }
}

#[async_trait]
impl Provider for FlakyProvider {
    fn provider_id(&self) -> &str {
        "flaky"
    }

    async fn query(&self, _query: ProviderQuery) -> Result<AgentEventStream, ProviderError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(ProviderError::RateLimit("slow down".into()));
        }
        let events: Vec<Result<AgentStreamEvent, ProviderError>> = vec![
            Ok(AgentStreamEvent::new(0, AgentStreamEventKind::Usage(TokenUsage { input_tokens: 1, output_tokens: 1, ..Default::default() }))),
            Ok(AgentStreamEvent::new(1, AgentStreamEventKind::TextComplete("Hello".into()))),
            Ok(AgentStreamEvent::new(
                2,
                AgentStreamEventKind::Result(AgentRunResult {
                    text: Some("Hello".into()),
                    structured_output: None,
                    stop_reason: Some(StopReason::EndTurn),
                    usage: TokenUsage::default(),
                }),
            )),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// S5 — provider retry on transient error: the first rate-limited call is
/// retried, the second succeeds, and exactly one `user:input` event is on
/// the log.
#[tokio::test(start_paused = true)]
async fn s5_provider_retry_on_transient_error() {
    let store = Arc::new(InMemoryEventLog::new());
    let retry = RetryPolicy {
        base_delay_ms: 1,
        max_delay_ms: 5,
        jitter_ms: 0,
        max_attempts: 3,
    };
    let config = Config::builder().retry(retry).build();
    let chronicle = Chronicle::with_store(store, chat_workflow(), config, providers_with(Arc::new(FlakyProvider::new())));

    let outcome = chronicle.run("Hi").await.expect("retry absorbs the transient failure");
    match outcome {
        RunOutcome::Completed { state, events, .. } => {
            assert_eq!(state.msgs.len(), 2);
            let user_inputs = events.iter().filter(|e| e.name == "user:input").count();
            assert_eq!(user_inputs, 1);
            assert!(events.iter().any(|e| e.name == "usage:reported"));
        }
        RunOutcome::Paused(_) => panic!("expected completion"),
    }
}
