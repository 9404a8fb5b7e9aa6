//! The transition table connecting workflow steps

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::{Error, Result};
use crate::step::StepId;

/// Where control goes after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Step(StepId),
    End,
}

/// Outgoing edges of one step, keyed by the state field that selects them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Always(Target),
    OnIntent {
        other: Target,
        request_filters: Target,
        extract_stream_name: Target,
    },
    OnToolOutcome {
        success: Target,
        error: Target,
    },
    OnChoice {
        refine: Target,
        end: Target,
    },
}

impl Transition {
    /// Every target this transition can select
    pub fn targets(&self) -> Vec<Target> {
        match self {
            Transition::Always(t) => vec![*t],
            Transition::OnIntent {
                other,
                request_filters,
                extract_stream_name,
            } => vec![*other, *request_filters, *extract_stream_name],
            Transition::OnToolOutcome { success, error } => vec![*success, *error],
            Transition::OnChoice { refine, end } => vec![*refine, *end],
        }
    }
}

/// A directed graph of steps with a single entry
#[derive(Debug, Clone)]
pub struct Graph {
    entry: StepId,
    /// Where a turn resumes while a refine/end answer is outstanding
    resume: StepId,
    transitions: BTreeMap<StepId, Transition>,
}

impl Graph {
    pub fn new(entry: StepId, resume: StepId) -> Self {
        Self {
            entry,
            resume,
            transitions: BTreeMap::new(),
        }
    }

    pub fn with_transition(mut self, from: StepId, transition: Transition) -> Self {
        self.transitions.insert(from, transition);
        self
    }

    /// The log-diagnosis workflow
    pub fn log_diagnosis() -> Self {
        use StepId::*;
        use Target::{End, Step};

        Self::new(DetectIntent, ProcessNextStepChoice)
            .with_transition(
                DetectIntent,
                Transition::OnIntent {
                    other: Step(HandleOtherIntent),
                    request_filters: Step(RequestFilters),
                    extract_stream_name: Step(ExtractStreamName),
                },
            )
            .with_transition(ExtractStreamName, Transition::Always(Step(ConfirmToolArgs)))
            .with_transition(RequestFilters, Transition::Always(Step(ConfirmToolArgs)))
            .with_transition(ConfirmToolArgs, Transition::Always(Step(ExecuteTool)))
            .with_transition(
                ExecuteTool,
                Transition::OnToolOutcome {
                    success: Step(AnalyzeLogs),
                    error: Step(HandleToolError),
                },
            )
            .with_transition(HandleToolError, Transition::Always(End))
            .with_transition(AnalyzeLogs, Transition::Always(Step(ProposeNextStep)))
            .with_transition(ProposeNextStep, Transition::Always(Step(ProcessNextStepChoice)))
            .with_transition(
                ProcessNextStepChoice,
                Transition::OnChoice {
                    refine: Step(DetectIntent),
                    end: End,
                },
            )
            .with_transition(HandleOtherIntent, Transition::Always(End))
    }

    pub fn entry(&self) -> StepId {
        self.entry
    }

    pub fn resume(&self) -> StepId {
        self.resume
    }

    pub fn transition(&self, from: StepId) -> Option<&Transition> {
        self.transitions.get(&from)
    }

    /// Check that every step reachable from the entry or resume point has a
    /// transition and an implementation in `registered`.
    pub fn validate(&self, registered: &BTreeSet<StepId>) -> Result<()> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([self.entry, self.resume]);

        while let Some(step) = queue.pop_front() {
            if !seen.insert(step) {
                continue;
            }
            if !registered.contains(&step) {
                return Err(Error::InvalidGraph(format!(
                    "no implementation registered for step {}",
                    step
                )));
            }
            let transition = self.transitions.get(&step).ok_or_else(|| {
                Error::InvalidGraph(format!("step {} has no outgoing transition", step))
            })?;
            for target in transition.targets() {
                if let Target::Step(next) = target {
                    queue.push_back(next);
                }
            }
        }

        Ok(())
    }
}
