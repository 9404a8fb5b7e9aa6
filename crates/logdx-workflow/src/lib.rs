//! logdx-workflow: Log-diagnosis workflow engine
//!
//! This crate provides the step graph that turns a user's request into a log
//! query, runs it, and analyzes the result, together with the queue that
//! streams progress to a consumer while a turn is running.

pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod queue;
pub mod reducer;
pub mod router;
pub mod state;
pub mod step;
pub mod steps;
pub mod tool;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{Engine, EngineConfig};
pub use error::{Error, QueueError, Result, StepError};
pub use events::{EventBus, WorkflowEvent};
pub use graph::{Graph, Target, Transition};
pub use queue::{StreamMessage, StreamMessageStream, StreamQueue};
pub use router::Router;
pub use state::{
    ConversationState, DEFAULT_STREAM, FilterCriteria, Intent, NextStep, PartialState, ToolArgs,
    ToolOutcome,
};
pub use step::{BoxedStep, Step, StepContext, StepId};
pub use tool::{LogQueryTool, SharedTool, tool_args_schema};
