//! Error types for logdx-workflow

use thiserror::Error;

use crate::step::StepId;

/// Result type alias using logdx-workflow Error
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal engine errors.
///
/// These signal a broken invariant in the workflow graph or state and are
/// never used for failures the graph knows how to handle.
#[derive(Error, Debug)]
pub enum Error {
    /// The transition table has no rule for the current state
    #[error("No transition from {from} for the current state: {reason}")]
    NoTransition { from: String, reason: String },

    /// The transition table failed validation
    #[error("Invalid workflow graph: {0}")]
    InvalidGraph(String),

    /// A step failed in a way the graph cannot route
    #[error("Step {step} failed: {source}")]
    Step {
        step: StepId,
        #[source]
        source: StepError,
    },

    /// A step was scheduled twice within one loop iteration
    #[error("Step {0} revisited without a refine re-entry")]
    StepRevisited(StepId),

    /// The turn exceeded the configured step budget
    #[error("Step limit of {0} exceeded")]
    StepLimit(usize),
}

/// Failures reported by individual steps
#[derive(Error, Debug)]
pub enum StepError {
    /// The reasoning service call failed
    #[error(transparent)]
    Reasoning(#[from] logdx_ai::Error),

    /// A field the step depends on was not set
    #[error("missing state field: {0}")]
    MissingState(&'static str),
}

/// Errors from the delivery queue
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    /// A consumer is already suspended in `get_message`
    #[error("a consumer is already waiting for a message")]
    AlreadyWaiting,
}
