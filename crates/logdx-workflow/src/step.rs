//! Step identifiers, the step trait, and the context steps run with

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use logdx_ai::{ChatMessage, Completion, SharedClient};
use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;
use crate::error::StepError;
use crate::state::{ConversationState, PartialState};
use crate::tool::SharedTool;

/// Every node of the log-diagnosis graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    DetectIntent,
    ExtractStreamName,
    RequestFilters,
    ConfirmToolArgs,
    ExecuteTool,
    HandleToolError,
    AnalyzeLogs,
    ProposeNextStep,
    ProcessNextStepChoice,
    HandleOtherIntent,
}

impl StepId {
    pub const ALL: [StepId; 10] = [
        StepId::DetectIntent,
        StepId::ExtractStreamName,
        StepId::RequestFilters,
        StepId::ConfirmToolArgs,
        StepId::ExecuteTool,
        StepId::HandleToolError,
        StepId::AnalyzeLogs,
        StepId::ProposeNextStep,
        StepId::ProcessNextStepChoice,
        StepId::HandleOtherIntent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::DetectIntent => "detect_intent",
            StepId::ExtractStreamName => "extract_stream_name",
            StepId::RequestFilters => "request_filters",
            StepId::ConfirmToolArgs => "confirm_tool_args",
            StepId::ExecuteTool => "execute_tool",
            StepId::HandleToolError => "handle_tool_error",
            StepId::AnalyzeLogs => "analyze_logs",
            StepId::ProposeNextStep => "propose_next_step",
            StepId::ProcessNextStepChoice => "process_next_step_choice",
            StepId::HandleOtherIntent => "handle_other_intent",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborators injected into every step
#[derive(Clone)]
pub struct StepContext {
    pub reasoning: SharedClient,
    pub tool: SharedTool,
    pub config: EngineConfig,
    /// Compiled validator for the tool's parameter schema
    pub(crate) validator: Option<Arc<jsonschema::Validator>>,
}

impl StepContext {
    pub fn new(reasoning: SharedClient, tool: SharedTool, config: EngineConfig) -> Self {
        let validator = match jsonschema::validator_for(&tool.parameters_schema()) {
            Ok(v) => Some(Arc::new(v)),
            Err(e) => {
                tracing::warn!(
                    "Invalid tool parameter schema for '{}', skipping validation: {}",
                    tool.name(),
                    e
                );
                None
            }
        };
        Self {
            reasoning,
            tool,
            config,
            validator,
        }
    }

    /// Call the reasoning service with a system instruction and one user turn
    pub async fn ask(
        &self,
        instruction: &str,
        content: impl Into<String>,
    ) -> Result<Completion, StepError> {
        let prompt = [ChatMessage::system(instruction), ChatMessage::user(content)];
        Ok(self.reasoning.invoke(&prompt).await?)
    }
}

/// A single unit of work in the workflow.
///
/// Steps read the state and return a partial update; they never mutate the
/// state themselves.
#[async_trait]
pub trait Step: Send + Sync {
    fn id(&self) -> StepId;

    async fn run(
        &self,
        state: &ConversationState,
        ctx: &StepContext,
    ) -> Result<PartialState, StepError>;
}

/// Type alias for a boxed step
pub type BoxedStep = Box<dyn Step>;
