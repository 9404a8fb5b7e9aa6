//! Scripted collaborators shared by the unit tests

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use logdx_ai::{ChatMessage, Completion, ReasoningClient};
use parking_lot::Mutex;

use crate::engine::EngineConfig;
use crate::state::{ToolArgs, ToolOutcome};
use crate::step::StepContext;
use crate::tool::LogQueryTool;

/// Replies with canned text in order and records every prompt.
///
/// A `None` entry fails the call with an API error.
#[derive(Clone, Default)]
pub struct ScriptedClient {
    replies: Arc<Mutex<VecDeque<Option<String>>>>,
    prompts: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedClient {
    pub fn new<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(
                replies.into_iter().map(|r| Some(r.into())).collect(),
            )),
            prompts: Arc::default(),
        }
    }

    /// Queue a failing call after the current replies
    pub fn then_fail(self) -> Self {
        self.replies.lock().push_back(None);
        self
    }

    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ReasoningClient for ScriptedClient {
    async fn invoke(&self, messages: &[ChatMessage]) -> logdx_ai::Result<Completion> {
        self.prompts.lock().push(messages.to_vec());
        match self.replies.lock().pop_front() {
            Some(Some(text)) => Ok(Completion::text(text)),
            Some(None) => Err(logdx_ai::Error::api("overloaded_error", "service unavailable")),
            None => Err(logdx_ai::Error::UnexpectedResponse(
                "no scripted reply left".into(),
            )),
        }
    }
}

/// Returns a fixed outcome and records the arguments it was called with.
#[derive(Clone)]
pub struct StaticTool {
    outcome: ToolOutcome,
    calls: Arc<Mutex<Vec<ToolArgs>>>,
}

impl StaticTool {
    pub fn new(outcome: ToolOutcome) -> Self {
        Self {
            outcome,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<ToolArgs> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl LogQueryTool for StaticTool {
    async fn execute(&self, args: &ToolArgs) -> ToolOutcome {
        self.calls.lock().push(args.clone());
        self.outcome.clone()
    }
}

pub fn context_with_tool(client: ScriptedClient, tool: StaticTool) -> StepContext {
    StepContext::new(Arc::new(client), Arc::new(tool), EngineConfig::default())
}

pub fn context(client: ScriptedClient) -> StepContext {
    context_with_tool(
        client,
        StaticTool::new(ToolOutcome::Success(serde_json::json!([]))),
    )
}
