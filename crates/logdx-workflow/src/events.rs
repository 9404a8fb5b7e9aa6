//! Workflow event types and the bus that carries them

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::step::StepId;

/// Events emitted while the engine runs a turn
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A turn started
    RunStart { session_id: String },

    /// A step is about to run
    StepStart { session_id: String, step: StepId },

    /// A step finished and its update was merged
    StepEnd { session_id: String, step: StepId },

    /// A step returned an error
    StepFailed {
        session_id: String,
        step: StepId,
        error: String,
    },

    /// A turn finished
    RunEnd {
        session_id: String,
        steps: usize,
        is_error: bool,
    },
}

impl WorkflowEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowEvent::RunEnd { .. })
    }
}

/// Broadcast channel for [`WorkflowEvent`]s.
///
/// Built by the application and handed to the engine; publishing with no
/// subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to workflow events
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: WorkflowEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
