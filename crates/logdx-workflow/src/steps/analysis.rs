//! Log analysis, next-step proposals, and the refine/end decision

use async_trait::async_trait;
use logdx_ai::ChatMessage;
use serde_json::{Value, json};

use super::prompts;
use crate::error::StepError;
use crate::state::{ConversationState, NextStep, PartialState, ToolOutcome};
use crate::step::{Step, StepContext, StepId};

/// Flatten a tool payload into log lines, keeping at most `max_lines`.
///
/// Accepts an array of records, an object holding one under `logs`, `lines`
/// or `records`, or any other value as a single line.
pub fn log_lines(data: &Value, max_lines: usize) -> Vec<String> {
    let records = match data {
        Value::Array(items) => Some(items),
        Value::Object(map) => ["logs", "lines", "records"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array)),
        _ => None,
    };

    let render = |v: &Value| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    match records {
        Some(items) => items.iter().take(max_lines).map(render).collect(),
        None if data.is_null() => Vec::new(),
        None => vec![render(data)],
    }
}

/// Decide between refining and ending from a classifier reply
pub fn parse_choice(reply: &str) -> NextStep {
    if reply.to_lowercase().contains("refine") {
        NextStep::Refine
    } else {
        NextStep::End
    }
}

/// Sends retrieved log lines for analysis
pub struct AnalyzeLogs;

#[async_trait]
impl Step for AnalyzeLogs {
    fn id(&self) -> StepId {
        StepId::AnalyzeLogs
    }

    async fn run(
        &self,
        state: &ConversationState,
        ctx: &StepContext,
    ) -> Result<PartialState, StepError> {
        let data = match &state.tool_result {
            Some(ToolOutcome::Success(data)) => data,
            _ => return Err(StepError::MissingState("tool_result")),
        };

        let lines = log_lines(data, ctx.config.max_log_lines);
        let content = if lines.is_empty() {
            format!("The `{}` stream returned no log lines.", state.stream_name)
        } else {
            format!(
                "Stream: {}\nLog lines ({}):\n{}",
                state.stream_name,
                lines.len(),
                lines.join("\n")
            )
        };

        let reply = ctx.ask(prompts::ANALYZE_LOGS, content).await?;
        Ok(PartialState::new().message(ChatMessage::assistant(reply.content)))
    }
}

/// Suggests actionable next steps from the latest analysis
pub struct ProposeNextStep;

#[async_trait]
impl Step for ProposeNextStep {
    fn id(&self) -> StepId {
        StepId::ProposeNextStep
    }

    async fn run(
        &self,
        state: &ConversationState,
        ctx: &StepContext,
    ) -> Result<PartialState, StepError> {
        let analysis = state
            .last_assistant_message()
            .ok_or(StepError::MissingState("messages"))?;
        let reply = ctx.ask(prompts::PROPOSE_NEXT_STEP, &analysis.content).await?;
        Ok(PartialState::new().message(ChatMessage::assistant(reply.content)))
    }
}

/// Classifies the user's reply to the proposal as refine or end.
///
/// Without a reply the choice defaults to `End` and the next turn resumes here.
pub struct ProcessNextStepChoice;

#[async_trait]
impl Step for ProcessNextStepChoice {
    fn id(&self) -> StepId {
        StepId::ProcessNextStepChoice
    }

    async fn run(
        &self,
        state: &ConversationState,
        ctx: &StepContext,
    ) -> Result<PartialState, StepError> {
        let Some(reply) = state.pending_reply() else {
            return Ok(PartialState::new()
                .next_step(NextStep::End)
                .awaiting_choice(true));
        };

        let verdict = ctx.ask(prompts::NEXT_STEP_CHOICE, &reply.content).await?;
        let choice = parse_choice(&verdict.content);
        tracing::debug!(?choice, "Processed next-step choice");

        Ok(PartialState::new()
            .next_step(choice)
            .awaiting_choice(false)
            .status("next_step", json!({ "nextStep": choice })))
    }
}
