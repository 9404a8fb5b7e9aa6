//! The steps of the log-diagnosis workflow

mod analysis;
mod execute;
mod intent;
mod params;
pub mod prompts;

pub use analysis::{AnalyzeLogs, ProcessNextStepChoice, ProposeNextStep, log_lines, parse_choice};
pub use execute::{ExecuteTool, HandleToolError};
pub use intent::{DetectIntent, HandleOtherIntent, classify_intent};
pub use params::{
    ConfirmToolArgs, DEFAULT_FORMAT, DEFAULT_LIMIT, ExtractStreamName, KNOWN_STREAMS,
    RequestFilters, extract_stream_name, parse_filters,
};

use crate::step::BoxedStep;

/// One implementation for every [`StepId`](crate::step::StepId)
pub fn default_steps() -> Vec<BoxedStep> {
    vec![
        Box::new(DetectIntent),
        Box::new(ExtractStreamName),
        Box::new(RequestFilters),
        Box::new(ConfirmToolArgs),
        Box::new(ExecuteTool),
        Box::new(HandleToolError),
        Box::new(AnalyzeLogs),
        Box::new(ProposeNextStep),
        Box::new(ProcessNextStepChoice),
        Box::new(HandleOtherIntent),
    ]
}
