//! Tool invocation and tool-failure recovery

use async_trait::async_trait;
use logdx_ai::ChatMessage;
use serde_json::json;

use crate::error::StepError;
use crate::state::{ConversationState, PartialState, ToolOutcome};
use crate::step::{Step, StepContext, StepId};
use crate::tool::validate_with_validator;

/// Runs the log-query tool with the confirmed arguments
pub struct ExecuteTool;

#[async_trait]
impl Step for ExecuteTool {
    fn id(&self) -> StepId {
        StepId::ExecuteTool
    }

    async fn run(
        &self,
        state: &ConversationState,
        ctx: &StepContext,
    ) -> Result<PartialState, StepError> {
        let args = state
            .tool_args
            .as_ref()
            .ok_or(StepError::MissingState("tool_args"))?;
        let tool_name = ctx.tool.name().to_string();

        let validation_error = match (&ctx.validator, serde_json::to_value(args)) {
            (Some(validator), Ok(value)) => validate_with_validator(&value, validator),
            (_, Err(e)) => Some(format!("Tool arguments could not be encoded: {}", e)),
            (None, Ok(_)) => None,
        };

        let outcome = match validation_error {
            Some(err) => ToolOutcome::Error(err),
            None => {
                match tokio::time::timeout(ctx.config.tool_timeout, ctx.tool.execute(args)).await {
                    Ok(outcome) => outcome,
                    Err(_) => ToolOutcome::Error("timeout".to_string()),
                }
            }
        };

        match &outcome {
            ToolOutcome::Success(_) => tracing::debug!(tool = %tool_name, "Tool call succeeded"),
            ToolOutcome::Error(e) => tracing::warn!(tool = %tool_name, "Tool call failed: {}", e),
        }

        Ok(PartialState::new()
            .status("tool_call", json!({ "tool": tool_name, "arguments": args }))
            .status(
                "tool_result",
                json!({ "tool": tool_name, "isError": outcome.is_error() }),
            )
            .tool_result(outcome))
    }
}

/// Explains a failed tool call to the user
pub struct HandleToolError;

#[async_trait]
impl Step for HandleToolError {
    fn id(&self) -> StepId {
        StepId::HandleToolError
    }

    async fn run(
        &self,
        state: &ConversationState,
        _ctx: &StepContext,
    ) -> Result<PartialState, StepError> {
        let error = state
            .tool_result
            .as_ref()
            .and_then(ToolOutcome::error_message)
            .unwrap_or("unknown error");
        let stream = state
            .tool_args
            .as_ref()
            .map(|a| a.stream_name.as_str())
            .unwrap_or(state.stream_name.as_str());

        let apology = format!(
            "Sorry, I couldn't retrieve logs from the `{}` stream: {}. \
             Please check the stream name and filters, or try again in a moment.",
            stream, error
        );
        Ok(PartialState::new().message(ChatMessage::assistant(apology)))
    }
}
