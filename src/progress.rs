//! Coarse progress and completion events pushed to an external observer.
//!
//! Fire-and-forget: the reporter never waits for acknowledgment and a
//! closed observer channel never fails the workflow.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::workflow::phase::Phase;

/// Events emitted by the core, tagged for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    UpdateProgress {
        current: u8,
        total: u8,
        message: String,
    },
    PostingComplete {
        #[serde(default)]
        requires_confirmation: bool,
    },
    PostingError {
        error: String,
    },
}

/// Push handle for workflow events.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ProgressReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report phase progress with the phase's fixed percent.
    pub fn phase_progress(&self, phase: Phase, message: impl Into<String>) {
        self.emit(WorkflowEvent::UpdateProgress {
            current: phase.progress_percent(),
            total: 100,
            message: message.into(),
        });
    }

    pub fn posting_complete(&self, requires_confirmation: bool) {
        self.emit(WorkflowEvent::PostingComplete {
            requires_confirmation,
        });
    }

    pub fn posting_error(&self, error: impl Into<String>) {
        self.emit(WorkflowEvent::PostingError {
            error: error.into(),
        });
    }

    fn emit(&self, event: WorkflowEvent) {
        // Observer gone is not our problem.
        let _ = self.tx.send(event);
    }
}
