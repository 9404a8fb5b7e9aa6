//! Intent detection and the fallback for unsupported requests

use async_trait::async_trait;
use logdx_ai::ChatMessage;
use serde_json::json;

use super::prompts;
use crate::error::StepError;
use crate::state::{ConversationState, Intent, PartialState};
use crate::step::{Step, StepContext, StepId};

/// Map a classifier reply onto an intent by substring.
///
/// Filter/search wording is checked before stream/log wording.
pub fn classify_intent(reply: &str) -> Intent {
    let reply = reply.to_lowercase();
    if reply.contains("filter") || reply.contains("search") {
        Intent::RequestFilters
    } else if reply.contains("stream") || reply.contains("log") {
        Intent::ExtractStreamName
    } else {
        Intent::Other
    }
}

/// Classifies the latest user message
pub struct DetectIntent;

#[async_trait]
impl Step for DetectIntent {
    fn id(&self) -> StepId {
        StepId::DetectIntent
    }

    async fn run(
        &self,
        state: &ConversationState,
        ctx: &StepContext,
    ) -> Result<PartialState, StepError> {
        let intent = match state.last_user_message() {
            Some(message) => {
                let reply = ctx.ask(prompts::DETECT_INTENT, &message.content).await?;
                classify_intent(&reply.content)
            }
            None => Intent::Other,
        };
        tracing::debug!(?intent, "Detected intent");

        Ok(PartialState::new()
            .intent(intent)
            .status("intent", json!({ "intent": intent })))
    }
}

/// Explains what the assistant can do
pub struct HandleOtherIntent;

#[async_trait]
impl Step for HandleOtherIntent {
    fn id(&self) -> StepId {
        StepId::HandleOtherIntent
    }

    async fn run(
        &self,
        _state: &ConversationState,
        _ctx: &StepContext,
    ) -> Result<PartialState, StepError> {
        Ok(PartialState::new().message(ChatMessage::assistant(prompts::OTHER_INTENT_REPLY)))
    }
}
