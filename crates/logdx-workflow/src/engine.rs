//! Drives a conversation turn through the workflow graph

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

use logdx_ai::{ChatMessage, SharedClient};
use serde_json::json;

use crate::error::{Error, Result, StepError};
use crate::events::{EventBus, WorkflowEvent};
use crate::graph::{Graph, Target};
use crate::queue::{StreamMessage, StreamQueue};
use crate::reducer::{MergeReport, merge};
use crate::router::Router;
use crate::state::{ConversationState, NextStep, PartialState};
use crate::step::{BoxedStep, StepContext, StepId};
use crate::steps::{default_steps, prompts};
use crate::tool::SharedTool;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on a single tool call
    pub tool_timeout: Duration,
    /// Maximum steps executed in one turn
    pub max_steps: usize,
    /// Maximum log lines sent for analysis
    pub max_log_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(30),
            max_steps: 32,
            max_log_lines: 200,
        }
    }
}

/// Runs turns of the log-diagnosis workflow.
///
/// The engine holds no per-conversation state, so one instance can serve
/// concurrent runs over different [`ConversationState`]s.
pub struct Engine {
    router: Router,
    steps: BTreeMap<StepId, BoxedStep>,
    ctx: StepContext,
    events: Option<EventBus>,
}

impl Engine {
    /// Create an engine for the log-diagnosis graph
    pub fn new(reasoning: SharedClient, tool: SharedTool) -> Result<Self> {
        Self::from_parts(Graph::log_diagnosis(), default_steps(), reasoning, tool)
    }

    /// Create an engine for an arbitrary graph; fails if the graph does not
    /// validate against the given steps.
    pub fn from_parts(
        graph: Graph,
        steps: Vec<BoxedStep>,
        reasoning: SharedClient,
        tool: SharedTool,
    ) -> Result<Self> {
        let steps: BTreeMap<StepId, BoxedStep> =
            steps.into_iter().map(|step| (step.id(), step)).collect();
        let registered: BTreeSet<StepId> = steps.keys().copied().collect();
        graph.validate(&registered)?;

        Ok(Self {
            router: Router::new(graph),
            steps,
            ctx: StepContext::new(reasoning, tool, EngineConfig::default()),
            events: None,
        })
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.ctx.config = config;
        self
    }

    /// Publish [`WorkflowEvent`]s on `bus`
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Run one turn: take `state.input`, walk the graph until it ends, and
    /// return the updated state.
    ///
    /// Every stream item produced along the way, starting with the user's
    /// input as a `message` item, is pushed to `queue` as soon as its step
    /// finishes. Reasoning failures end the turn normally with
    /// `error` set; a broken graph or state is returned as `Err`.
    pub async fn run(
        &self,
        mut state: ConversationState,
        queue: &StreamQueue,
    ) -> Result<ConversationState> {
        let session_id = state.session_id().to_string();
        self.publish(WorkflowEvent::RunStart {
            session_id: session_id.clone(),
        });
        tracing::debug!(session = %session_id, "Starting turn");

        let mut steps_run = 0;
        let result = self.drive(&mut state, queue, &mut steps_run).await;

        self.publish(WorkflowEvent::RunEnd {
            session_id,
            steps: steps_run,
            is_error: result.is_err() || state.has_error(),
        });

        result.map(|()| state)
    }

    async fn drive(
        &self,
        state: &mut ConversationState,
        queue: &StreamQueue,
        steps_run: &mut usize,
    ) -> Result<()> {
        state.error.clear();
        state.final_result = None;
        if !state.awaiting_choice {
            state.clear_iteration();
        }
        let turn_start = state.messages.len();
        if !state.input.is_empty() {
            let input = PartialState::new().message(ChatMessage::user(state.input.clone()));
            self.apply(state, input, queue);
        }

        let mut visited = HashSet::new();
        let mut target = self.router.entry(state)?;

        while let Target::Step(step_id) = target {
            if !visited.insert(step_id) {
                return Err(Error::StepRevisited(step_id));
            }
            *steps_run += 1;
            if *steps_run > self.ctx.config.max_steps {
                return Err(Error::StepLimit(self.ctx.config.max_steps));
            }

            self.run_step(step_id, state, queue).await?;

            let refine = step_id == StepId::ProcessNextStepChoice
                && state.next_step == Some(NextStep::Refine);
            target = self.router.next(step_id, state)?;

            if refine {
                // Re-entering the graph starts a fresh iteration
                state.clear_iteration();
                visited.clear();
            }
        }

        self.finish(state, turn_start, queue);
        Ok(())
    }

    async fn run_step(
        &self,
        step_id: StepId,
        state: &mut ConversationState,
        queue: &StreamQueue,
    ) -> Result<()> {
        let step = self.steps.get(&step_id).ok_or_else(|| {
            Error::InvalidGraph(format!("no implementation registered for step {}", step_id))
        })?;
        let session_id = state.session_id().to_string();

        self.publish(WorkflowEvent::StepStart {
            session_id: session_id.clone(),
            step: step_id,
        });
        tracing::debug!(step = %step_id, "Running step");

        match step.run(state, &self.ctx).await {
            Ok(update) => {
                self.apply(state, update, queue);
                self.publish(WorkflowEvent::StepEnd {
                    session_id,
                    step: step_id,
                });
                Ok(())
            }
            Err(StepError::Reasoning(e)) => {
                tracing::warn!(step = %step_id, "Reasoning service call failed: {}", e);
                self.publish(WorkflowEvent::StepFailed {
                    session_id,
                    step: step_id,
                    error: e.to_string(),
                });
                let update = PartialState::new()
                    .error(prompts::REASONING_FAILURE_REPLY)
                    .message(ChatMessage::assistant(prompts::REASONING_FAILURE_REPLY));
                self.apply(state, update, queue);
                Ok(())
            }
            Err(source) => {
                tracing::error!(step = %step_id, "Step failed: {}", source);
                self.publish(WorkflowEvent::StepFailed {
                    session_id,
                    step: step_id,
                    error: source.to_string(),
                });
                Err(Error::Step {
                    step: step_id,
                    source,
                })
            }
        }
    }

    /// Close the turn with a reply and record the final result.
    fn finish(&self, state: &mut ConversationState, turn_start: usize, queue: &StreamQueue) {
        let replied = state.messages[turn_start..].iter().any(|m| m.is_assistant());
        if !replied {
            let update =
                PartialState::new().message(ChatMessage::assistant(prompts::CLOSING_REPLY));
            self.apply(state, update, queue);
        }

        let final_result = state.last_assistant_message().map(|m| m.content.clone());
        let mut update = PartialState::new();
        if let Some(text) = final_result {
            update = update
                .status("final", json!({ "content": text }))
                .final_result(text);
        }
        self.apply(state, update, queue);
    }

    /// Merge an update, mirror new chat messages into the stream, and deliver
    /// the new stream items.
    fn apply(&self, state: &mut ConversationState, update: PartialState, queue: &StreamQueue) {
        let MergeReport {
            messages,
            streaming_messages,
        } = merge(state, update);

        let session_id = state.session_id().to_string();
        let mirrored: Vec<StreamMessage> = state.messages[messages]
            .iter()
            .map(|m| {
                StreamMessage::new("message", json!({ "role": m.role, "content": m.content }))
                    .with_session(session_id.clone())
            })
            .collect();
        let start = streaming_messages.start;
        state.streaming_messages.extend(mirrored);

        for message in &mut state.streaming_messages[start..] {
            if message.session_id.is_none() {
                message.session_id = Some(session_id.clone());
            }
            queue.add_message(message.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Intent, ToolOutcome};
    use crate::test_support::{ScriptedClient, StaticTool};
    use futures::FutureExt;
    use std::sync::Arc;

    fn engine(client: &ScriptedClient, tool: &StaticTool) -> Engine {
        Engine::new(Arc::new(client.clone()), Arc::new(tool.clone())).unwrap()
    }

    fn drain(queue: &StreamQueue) -> Vec<StreamMessage> {
        let mut out = Vec::new();
        while let Some(Ok(Some(m))) = queue.get_message().now_or_never() {
            out.push(m);
        }
        out
    }

    #[tokio::test]
    async fn test_error_logs_success_path() {
        let client = ScriptedClient::new([
            "extract_stream_name",
            "Disk full on db-1 caused the write errors.",
            "1. Free disk space on db-1. Refine or end?",
        ]);
        let tool = StaticTool::new(ToolOutcome::Success(json!(["ERROR disk full"])));
        let queue = StreamQueue::new();

        let state = ConversationState::new("s-1", "c-1").with_input("show me error logs");
        let state = engine(&client, &tool).run(state, &queue).await.unwrap();

        assert_eq!(state.intent, Some(Intent::ExtractStreamName));
        assert_eq!(state.stream_name, "error");
        let args = state.tool_args.as_ref().unwrap();
        assert_eq!(args.stream_name, "error");
        assert_eq!(args.limit, 100);
        assert_eq!(args.format, "json");
        assert!(args.filters.is_empty());
        assert_eq!(tool.calls().len(), 1);
        assert!(matches!(state.tool_result, Some(ToolOutcome::Success(_))));
        assert_eq!(state.next_step, Some(NextStep::End));
        assert!(state.awaiting_choice);
        assert!(!state.has_error());

        // user, confirmation, analysis, proposal
        assert_eq!(state.messages.len(), 4);
        assert!(state.messages[1].content.contains("`error` stream"));
        assert_eq!(state.messages[2].content, "Disk full on db-1 caused the write errors.");
        assert_eq!(
            state.final_result.as_deref(),
            Some("1. Free disk space on db-1. Refine or end?")
        );
        // intent, analysis and proposal
        assert_eq!(client.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_tool_timeout_routes_to_apology() {
        let client = ScriptedClient::new(["extract_stream_name"]);
        let tool = StaticTool::new(ToolOutcome::Error("timeout".into()));
        let queue = StreamQueue::new();

        let state = ConversationState::new("s", "c").with_input("show me error logs");
        let state = engine(&client, &tool).run(state, &queue).await.unwrap();

        assert_eq!(state.tool_result, Some(ToolOutcome::Error("timeout".into())));
        let last = state.last_message().unwrap();
        assert!(last.is_assistant());
        assert!(last.content.starts_with("Sorry"));
        assert!(last.content.contains("timeout"));
        assert_eq!(state.final_result.as_deref(), Some(last.content.as_str()));
        assert!(!state.awaiting_choice);
    }

    #[tokio::test]
    async fn test_other_intent_explains_capabilities() {
        let client = ScriptedClient::new(["other"]);
        let tool = StaticTool::new(ToolOutcome::Success(json!([])));
        let queue = StreamQueue::new();

        let state = ConversationState::new("s", "c").with_input("what's the weather?");
        let state = engine(&client, &tool).run(state, &queue).await.unwrap();

        assert_eq!(state.intent, Some(Intent::Other));
        assert!(tool.calls().is_empty());
        assert_eq!(
            state.final_result.as_deref(),
            Some(prompts::OTHER_INTENT_REPLY)
        );
    }

    #[tokio::test]
    async fn test_refine_reply_resumes_and_reruns_graph() {
        let client = ScriptedClient::new([
            "extract_stream_name",
            "analysis one",
            "proposal one",
            // second turn
            "refine",
            "extract_stream_name",
            "analysis two",
            "proposal two",
        ]);
        let tool = StaticTool::new(ToolOutcome::Success(json!(["line"])));
        let engine = engine(&client, &tool);
        let queue = StreamQueue::new();

        let state = ConversationState::new("s", "c").with_input("show me error logs");
        let state = engine.run(state, &queue).await.unwrap();
        assert!(state.awaiting_choice);

        let state = engine
            .run(state.with_input("refine: only the audit logs"), &queue)
            .await
            .unwrap();

        assert_eq!(tool.calls().len(), 2);
        assert_eq!(tool.calls()[1].stream_name, "audit");
        assert_eq!(state.final_result.as_deref(), Some("proposal two"));
        // The refine iteration stops at the question again rather than looping
        assert!(state.awaiting_choice);
        assert_eq!(state.next_step, Some(NextStep::End));
    }

    #[tokio::test]
    async fn test_end_reply_closes_conversation() {
        let client = ScriptedClient::new([
            "extract_stream_name",
            "analysis",
            "proposal",
            "end",
        ]);
        let tool = StaticTool::new(ToolOutcome::Success(json!(["line"])));
        let engine = engine(&client, &tool);
        let queue = StreamQueue::new();

        let state = ConversationState::new("s", "c").with_input("show me error logs");
        let state = engine.run(state, &queue).await.unwrap();
        let state = engine
            .run(state.with_input("that's all, thanks"), &queue)
            .await
            .unwrap();

        assert_eq!(state.next_step, Some(NextStep::End));
        assert!(!state.awaiting_choice);
        assert_eq!(tool.calls().len(), 1);
        assert_eq!(state.final_result.as_deref(), Some(prompts::CLOSING_REPLY));
    }

    #[tokio::test]
    async fn test_reasoning_failure_sets_error() {
        let client = ScriptedClient::new(Vec::<&str>::new()).then_fail();
        let tool = StaticTool::new(ToolOutcome::Success(json!([])));
        let queue = StreamQueue::new();

        let state = ConversationState::new("s", "c").with_input("show me error logs");
        let state = engine(&client, &tool).run(state, &queue).await.unwrap();

        assert!(state.has_error());
        assert!(tool.calls().is_empty());
        let last = state.last_message().unwrap();
        assert!(last.is_assistant());
        assert_eq!(last.content, prompts::REASONING_FAILURE_REPLY);
        assert_eq!(
            state.final_result.as_deref(),
            Some(prompts::REASONING_FAILURE_REPLY)
        );
    }

    #[tokio::test]
    async fn test_request_filters_path_queries_with_filters() {
        let client = ScriptedClient::new([
            "filter",
            r#"{"level": "warn", "service": "auth"}"#,
            "Repeated token refresh failures.",
            "Refine or end?",
        ]);
        let tool = StaticTool::new(ToolOutcome::Success(json!(["WARN refresh failed"])));
        let queue = StreamQueue::new();

        let state = ConversationState::new("s", "c").with_input("search warnings from auth");
        let state = engine(&client, &tool).run(state, &queue).await.unwrap();

        assert_eq!(state.intent, Some(Intent::RequestFilters));
        let calls = tool.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].filters["level"], json!("warn"));
        assert_eq!(calls[0].filters["service"], json!("auth"));
        assert_eq!(calls[0].stream_name, crate::state::DEFAULT_STREAM);
        assert!(state.messages[1].content.contains("level=warn"));
        assert_eq!(state.final_result.as_deref(), Some("Refine or end?"));
        assert!(state.awaiting_choice);
    }

    #[tokio::test]
    async fn test_reasoning_failure_after_tool_success_ends_turn() {
        let client = ScriptedClient::new(["extract_stream_name"]).then_fail();
        let tool = StaticTool::new(ToolOutcome::Success(json!(["ERROR disk full"])));
        let queue = StreamQueue::new();

        let state = ConversationState::new("s", "c").with_input("show me error logs");
        let state = engine(&client, &tool).run(state, &queue).await.unwrap();

        assert_eq!(tool.calls().len(), 1);
        assert!(matches!(state.tool_result, Some(ToolOutcome::Success(_))));
        assert!(state.has_error());
        assert_eq!(
            state.final_result.as_deref(),
            Some(prompts::REASONING_FAILURE_REPLY)
        );
        // intent and the failed analysis; the proposal is never requested
        assert_eq!(client.prompts().len(), 2);
        assert!(!state.awaiting_choice);
        assert_eq!(state.next_step, None);
    }

    #[tokio::test]
    async fn test_error_is_cleared_on_next_turn() {
        let client = ScriptedClient::new(["other"]);
        let tool = StaticTool::new(ToolOutcome::Success(json!([])));
        let queue = StreamQueue::new();

        let mut state = ConversationState::new("s", "c").with_input("hello");
        state.error = "previous failure".into();
        let state = engine(&client, &tool).run(state, &queue).await.unwrap();

        assert!(!state.has_error());
        assert_eq!(state.intent, Some(Intent::Other));
    }

    #[tokio::test]
    async fn test_stream_items_delivered_in_order() {
        let client = ScriptedClient::new(["extract_stream_name", "analysis", "proposal"]);
        let tool = StaticTool::new(ToolOutcome::Success(json!(["line"])));
        let queue = StreamQueue::new();

        let state = ConversationState::new("s-9", "c").with_input("show me error logs");
        let state = engine(&client, &tool).run(state, &queue).await.unwrap();

        let delivered = drain(&queue);
        assert_eq!(delivered, state.streaming_messages);
        assert!(delivered.iter().all(|m| m.session_id.as_deref() == Some("s-9")));

        let kinds: Vec<&str> = delivered.iter().map(|m| m.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "message",
                "intent",
                "stream_name",
                "message",
                "tool_call",
                "tool_result",
                "message",
                "message",
                "final",
            ]
        );
        let contents: Vec<&str> = delivered
            .iter()
            .filter(|m| m.kind == "message")
            .filter_map(|m| m.payload["content"].as_str())
            .collect();
        assert_eq!(contents[0], "show me error logs");
        assert_eq!(delivered[0].payload["role"], "user");
        assert_eq!(contents[2..], ["analysis", "proposal"]);
    }

    #[tokio::test]
    async fn test_closed_queue_does_not_fail_run() {
        let client = ScriptedClient::new(["other"]);
        let tool = StaticTool::new(ToolOutcome::Success(json!([])));
        let queue = StreamQueue::new();
        queue.close();

        let state = ConversationState::new("s", "c").with_input("hi");
        let state = engine(&client, &tool).run(state, &queue).await.unwrap();

        assert!(!state.streaming_messages.is_empty());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_events_published() {
        let client = ScriptedClient::new(["other"]);
        let tool = StaticTool::new(ToolOutcome::Success(json!([])));
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let engine = engine(&client, &tool).with_event_bus(bus);

        let state = ConversationState::new("s", "c").with_input("hi");
        engine.run(state, &StreamQueue::new()).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(WorkflowEvent::RunStart { .. })));
        assert!(matches!(
            events.last(),
            Some(WorkflowEvent::RunEnd { steps: 2, is_error: false, .. })
        ));
        let started: Vec<StepId> = events
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::StepStart { step, .. } => Some(*step),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![StepId::DetectIntent, StepId::HandleOtherIntent]);
    }

    #[tokio::test]
    async fn test_step_limit() {
        let client = ScriptedClient::new(["extract_stream_name"]);
        let tool = StaticTool::new(ToolOutcome::Success(json!([])));
        let engine = engine(&client, &tool).with_config(EngineConfig {
            max_steps: 2,
            ..EngineConfig::default()
        });

        let state = ConversationState::new("s", "c").with_input("show me error logs");
        let err = engine.run(state, &StreamQueue::new()).await.unwrap_err();
        assert!(matches!(err, Error::StepLimit(2)));
    }

    #[tokio::test]
    async fn test_invalid_graph_rejected_at_construction() {
        let client = ScriptedClient::new(Vec::<&str>::new());
        let tool = StaticTool::new(ToolOutcome::Success(json!([])));
        let mut steps = default_steps();
        steps.retain(|s| s.id() != StepId::ExecuteTool);

        let result = Engine::from_parts(
            Graph::log_diagnosis(),
            steps,
            Arc::new(client),
            Arc::new(tool),
        );
        assert!(matches!(result, Err(Error::InvalidGraph(_))));
    }
}
