//! Workspace-level composability checks: the same workflow definition
//! driven against two different [`chronicle_store::EventLog`]
//! implementations must derive identical state, and the umbrella
//! `Chronicle` handle must agree with driving `chronicle-engine` directly
//! over the same store. No live API keys are needed — a canned provider
//! stands in for the network.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chronicle::prelude::*;
use chronicle_engine::{Config as EngineConfig, ExecutionDriver, RunOutcome as EngineRunOutcome};
use chronicle_provider::{AgentEventStream, Provider, ProviderError, ProviderQuery};
use chronicle_types::{AgentRunResult, AgentStreamEvent, AgentStreamEventKind, StopReason, TokenUsage};
use futures::stream;

#[derive(Debug, Clone, Default, PartialEq)]
struct GreetState {
    greeted: u32,
}

fn greeter_workflow() -> WorkflowDef<GreetState> {
    let greeter = Agent {
        name: "greeter".to_string(),
        activates_on: ["user:input".to_string()].into_iter().collect::<HashSet<_>>(),
        emits: ["text:complete".to_string()].into_iter().collect(),
        model: None,
        prompt: Arc::new(|_state, _event| PromptTemplate::user("hi")),
        when: None,
        output_schema: JsonSchema::object(),
        on_output: Arc::new(|_output, _trigger| Vec::new()),
    };

    WorkflowBuilder::new("greeter-workflow", GreetState::default())
        .on(
            "text:complete",
            Arc::new(FnHandler::new(|state: &GreetState, _event| {
                HandlerOutcome::state_only(GreetState { greeted: state.greeted + 1 })
            })),
        )
        .agent(greeter)
        .until(Arc::new(|state: &GreetState| state.greeted >= 1))
        .build()
        .expect("greeter workflow definition is valid")
}

struct GreetProvider;

#[async_trait]
impl Provider for GreetProvider {
    fn provider_id(&self) -> &str {
        "greet-fixture"
    }

    async fn query(&self, _query: ProviderQuery) -> Result<AgentEventStream, ProviderError> {
        let events: Vec<Result<AgentStreamEvent, ProviderError>> = vec![
            Ok(AgentStreamEvent::new(0, AgentStreamEventKind::TextComplete("hello there".into()))),
            Ok(AgentStreamEvent::new(
                1,
                AgentStreamEventKind::Result(AgentRunResult {
                    text: Some("hello there".into()),
                    structured_output: None,
                    stop_reason: Some(StopReason::EndTurn),
                    usage: TokenUsage::default(),
                }),
            )),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

fn providers() -> ProviderMap {
    let mut providers: ProviderMap = BTreeMap::new();
    providers.insert(chronicle_engine::DEFAULT_PROVIDER_KEY.to_string(), Arc::new(GreetProvider));
    providers
}

async fn run_against(store: Arc<dyn EventLog>) -> (GreetState, Vec<String>) {
    let registry = Arc::new(HubRegistry::new(store.clone()));
    let driver = ExecutionDriver::new(store.clone(), registry, providers(), EngineConfig::default());
    match driver.start(&greeter_workflow(), "hi").await.expect("run succeeds") {
        EngineRunOutcome::Completed { session_id, state } => {
            let events = store.get_events(&session_id).await.expect("events readable");
            (state, events.into_iter().map(|e| e.name).collect())
        }
        EngineRunOutcome::Paused(_) => panic!("expected completion"),
    }
}

/// The same workflow, driven directly through `chronicle-engine`, derives
/// the same state and the same event name sequence whether the durable
/// log backing it is in-memory or SQLite.
#[tokio::test]
async fn store_swap_produces_identical_derived_state() {
    let (memory_state, memory_names) = run_against(Arc::new(InMemoryEventLog::new())).await;
    let (sqlite_state, sqlite_names) = run_against(Arc::new(SqliteEventLog::open_in_memory().expect("sqlite opens"))).await;

    assert_eq!(memory_state, sqlite_state);
    assert_eq!(memory_names, sqlite_names);
}

/// The umbrella `Chronicle` handle is a thin wrapper: driving the same
/// workflow through it over the same kind of store reaches the same
/// final state as driving `chronicle-engine` directly.
#[tokio::test]
async fn umbrella_handle_agrees_with_the_engine_it_wraps() {
    let (engine_state, _) = run_against(Arc::new(InMemoryEventLog::new())).await;

    let store: Arc<dyn EventLog> = Arc::new(InMemoryEventLog::new());
    let chronicle = Chronicle::with_store(store, greeter_workflow(), Config::default(), providers());
    let outcome = chronicle.run("hi").await.expect("run succeeds");
    match outcome {
        RunOutcome::Completed { state, .. } => assert_eq!(state, engine_state),
        RunOutcome::Paused(_) => panic!("expected completion"),
    }
}
