//! A complete, runnable single-agent workflow using an in-process echo
//! provider — no vendor SDK or API key required.
//!
//! Run with:
//!
//! ```sh
//! cargo run --example quickstart -p chronicle
//! ```

use std::collections::{BTreeMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chronicle::prelude::*;
use chronicle_engine::ProviderMap;
use chronicle_provider::{AgentEventStream, Provider, ProviderError, ProviderQuery};
use chronicle_store::InMemoryEventLog;
use chronicle_types::{AgentRunResult, AgentStreamEvent, AgentStreamEventKind, StopReason, TokenUsage};
use futures::{stream, Stream};

/// A `Provider` that echoes the prompt's last user message back as its
/// structured output, standing in for a real vendor backend.
struct EchoProvider;

#[async_trait]
impl Provider for EchoProvider {
    fn provider_id(&self) -> &str {
        "echo"
    }

    async fn query(&self, query: ProviderQuery) -> Result<AgentEventStream, ProviderError> {
        let text = query
            .prompt
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let result = AgentRunResult {
            text: Some(text.clone()),
            structured_output: Some(serde_json::json!({ "reply": text })),
            stop_reason: Some(StopReason::EndTurn),
            usage: TokenUsage::default(),
        };
        let events: Vec<Result<AgentStreamEvent, ProviderError>> =
            vec![Ok(AgentStreamEvent::new(0, AgentStreamEventKind::Result(result)))];
        let stream: Pin<Box<dyn Stream<Item = Result<AgentStreamEvent, ProviderError>> + Send>> =
            Box::pin(stream::iter(events));
        Ok(stream)
    }
}

#[derive(Clone, Default, Debug)]
struct GreeterState {
    replies: u32,
}

#[tokio::main]
async fn main() -> Result<(), ChronicleError> {
    tracing_subscriber::fmt::init();

    let greeter = Agent {
        name: "greeter".to_string(),
        activates_on: ["user:input".to_string()].into_iter().collect::<HashSet<_>>(),
        emits: ["agent:greeted".to_string()].into_iter().collect(),
        model: None,
        prompt: Arc::new(|_state, event| {
            let text = event.payload.get("text").and_then(|v| v.as_str()).unwrap_or_default();
            PromptTemplate::user(format!("Say hello back to: {text}"))
        }),
        when: None,
        output_schema: JsonSchema::object(),
        on_output: Arc::new(|_output, trigger| vec![EventDraft::new("agent:greeted").caused_by(trigger.id.clone())]),
    };

    let workflow = WorkflowBuilder::new("greeter-workflow", GreeterState::default())
        .on(
            "agent:greeted",
            Arc::new(FnHandler::new(|state: &GreeterState, _event| {
                HandlerOutcome::state_only(GreeterState {
                    replies: state.replies + 1,
                })
            })),
        )
        .agent(greeter)
        .until(Arc::new(|state: &GreeterState| state.replies >= 1))
        .build()
        .expect("workflow definition is valid");

    let mut providers: ProviderMap = BTreeMap::new();
    providers.insert("default".to_string(), Arc::new(EchoProvider));

    let store = Arc::new(InMemoryEventLog::new());
    let chronicle = Chronicle::with_store(store, workflow, Config::default(), providers);

    match chronicle.run("hi there").await? {
        RunOutcome::Completed { session_id, state, tape, .. } => {
            println!("session {session_id} completed with {} replies", state.replies);
            println!("tape length: {}", tape.length());
        }
        RunOutcome::Paused(paused) => {
            println!("session {} paused at node {:?}", paused.session_id, paused.current_node_id);
        }
    }

    Ok(())
}
