//! Picks the next step from the transition table and the current state

use crate::error::{Error, Result};
use crate::graph::{Graph, Target, Transition};
use crate::state::{ConversationState, Intent, NextStep, ToolOutcome};
use crate::step::StepId;

/// Resolves transitions against a [`ConversationState`].
///
/// A non-empty `error` always ends the turn.
#[derive(Debug, Clone)]
pub struct Router {
    graph: Graph,
}

impl Router {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    /// First step of a turn.
    ///
    /// Resumes at the refine/end question when one is outstanding and skips
    /// intent detection when the intent is already known.
    pub fn entry(&self, state: &ConversationState) -> Result<Target> {
        if state.has_error() {
            return Ok(Target::End);
        }
        if state.awaiting_choice {
            return Ok(Target::Step(self.graph.resume()));
        }
        match state.intent {
            None => Ok(Target::Step(self.graph.entry())),
            Some(_) => self.next(self.graph.entry(), state),
        }
    }

    /// Step that follows `current`
    pub fn next(&self, current: StepId, state: &ConversationState) -> Result<Target> {
        if state.has_error() {
            return Ok(Target::End);
        }

        let transition = self
            .graph
            .transition(current)
            .ok_or_else(|| no_transition(current, "step has no outgoing transition"))?;

        let target = match transition {
            Transition::Always(target) => *target,
            Transition::OnIntent {
                other,
                request_filters,
                extract_stream_name,
            } => match state.intent {
                Some(Intent::Other) => *other,
                Some(Intent::RequestFilters) => *request_filters,
                Some(Intent::ExtractStreamName) => *extract_stream_name,
                None => return Err(no_transition(current, "intent is unset")),
            },
            Transition::OnToolOutcome { success, error } => match state.tool_result {
                Some(ToolOutcome::Success(_)) => *success,
                Some(ToolOutcome::Error(_)) => *error,
                None => return Err(no_transition(current, "tool_result is unset")),
            },
            Transition::OnChoice { refine, end } => match state.next_step {
                Some(NextStep::Refine) => *refine,
                Some(NextStep::End) => *end,
                None => return Err(no_transition(current, "next_step is unset")),
            },
        };

        tracing::debug!(from = %current, to = ?target, "Routed");
        Ok(target)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(Graph::log_diagnosis())
    }
}

fn no_transition(from: StepId, reason: &str) -> Error {
    Error::NoTransition {
        from: from.to_string(),
        reason: reason.to_string(),
    }
}
