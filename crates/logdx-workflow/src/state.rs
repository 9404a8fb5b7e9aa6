//! Conversation state threaded through every workflow step

use std::collections::BTreeMap;

use logdx_ai::{ChatMessage, Role};
use serde::{Deserialize, Serialize};

use crate::queue::StreamMessage;

/// Stream name used until a step resolves one
pub const DEFAULT_STREAM: &str = "default-stream";

/// Filter key to value, ordered for stable prompts and payloads
pub type FilterCriteria = BTreeMap<String, serde_json::Value>;

/// What the user asked for in the current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Other,
    RequestFilters,
    ExtractStreamName,
}

/// The user's decision after a diagnosis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    Refine,
    End,
}

/// Request payload for the log-query tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolArgs {
    pub stream_name: String,
    pub filters: FilterCriteria,
    pub limit: u32,
    pub format: String,
}

/// Result of the last tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(serde_json::Value),
    Error(String),
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error(_))
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ToolOutcome::Error(message) => Some(message),
            ToolOutcome::Success(_) => None,
        }
    }
}

/// State of one conversation, carried across workflow turns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    session_id: String,
    chat_id: String,
    /// Latest user utterance
    pub input: String,
    pub messages: Vec<ChatMessage>,
    pub stream_name: String,
    pub filter_criteria: FilterCriteria,
    pub intent: Option<Intent>,
    pub tool_args: Option<ToolArgs>,
    pub tool_result: Option<ToolOutcome>,
    pub next_step: Option<NextStep>,
    /// Last fatal error surfaced to the user, empty when none
    pub error: String,
    pub streaming_messages: Vec<StreamMessage>,
    pub final_result: Option<String>,
    /// The previous turn stopped at the refine/end question without a reply
    #[serde(default)]
    pub awaiting_choice: bool,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            chat_id: chat_id.into(),
            input: String::new(),
            messages: Vec::new(),
            stream_name: DEFAULT_STREAM.to_string(),
            filter_criteria: FilterCriteria::new(),
            intent: None,
            tool_args: None,
            tool_result: None,
            next_step: None,
            error: String::new(),
            streaming_messages: Vec::new(),
            final_result: None,
            awaiting_choice: false,
        }
    }

    /// Set the input for the next turn
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn last_user_message(&self) -> Option<&ChatMessage> {
        self.last_with_role(Role::User)
    }

    pub fn last_assistant_message(&self) -> Option<&ChatMessage> {
        self.last_with_role(Role::Assistant)
    }

    /// The user's reply to the latest assistant output, if the conversation
    /// currently ends with one.
    pub fn pending_reply(&self) -> Option<&ChatMessage> {
        self.messages.last().filter(|m| m.is_user())
    }

    fn last_with_role(&self, role: Role) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == role)
    }

    /// Clear the fields owned by one pass through the graph.
    pub(crate) fn clear_iteration(&mut self) {
        self.intent = None;
        self.tool_args = None;
        self.tool_result = None;
        self.next_step = None;
    }
}

/// A partial update returned by a step.
///
/// `None` scalars leave the state untouched; sequences are appended.
#[derive(Debug, Clone, Default)]
pub struct PartialState {
    pub messages: Vec<ChatMessage>,
    pub stream_name: Option<String>,
    pub filter_criteria: Option<FilterCriteria>,
    pub intent: Option<Intent>,
    pub tool_args: Option<ToolArgs>,
    pub tool_result: Option<ToolOutcome>,
    pub next_step: Option<NextStep>,
    pub error: Option<String>,
    pub streaming_messages: Vec<StreamMessage>,
    pub final_result: Option<String>,
    pub awaiting_choice: Option<bool>,
}

impl PartialState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn status(mut self, kind: impl Into<String>, payload: serde_json::Value) -> Self {
        self.streaming_messages.push(StreamMessage::new(kind, payload));
        self
    }

    pub fn stream_name(mut self, stream_name: impl Into<String>) -> Self {
        self.stream_name = Some(stream_name.into());
        self
    }

    pub fn filter_criteria(mut self, filters: FilterCriteria) -> Self {
        self.filter_criteria = Some(filters);
        self
    }

    pub fn intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn tool_args(mut self, args: ToolArgs) -> Self {
        self.tool_args = Some(args);
        self
    }

    pub fn tool_result(mut self, outcome: ToolOutcome) -> Self {
        self.tool_result = Some(outcome);
        self
    }

    pub fn next_step(mut self, next: NextStep) -> Self {
        self.next_step = Some(next);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn final_result(mut self, text: impl Into<String>) -> Self {
        self.final_result = Some(text.into());
        self
    }

    pub fn awaiting_choice(mut self, waiting: bool) -> Self {
        self.awaiting_choice = Some(waiting);
        self
    }
}
