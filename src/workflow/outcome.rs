//! Step outcomes and the step error taxonomy.
//!
//! Handlers signal expected, recoverable conditions by returning a
//! `Failure` outcome with detail. `StepError` is reserved for conditions
//! the retry executor classifies and the orchestrator acts on.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::sink::ActionError;

/// Result of one step handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: StepStatus,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failure,
    Skipped,
}

impl StepOutcome {
    pub fn success() -> Self {
        Self {
            status: StepStatus::Success,
            detail: None,
        }
    }

    pub fn success_with(detail: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Success,
            detail: Some(detail.into()),
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failure,
            detail: Some(detail.into()),
        }
    }

    pub fn skipped(detail: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Skipped,
            detail: Some(detail.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, StepStatus::Success | StepStatus::Skipped)
    }

    pub fn is_failure(&self) -> bool {
        self.status == StepStatus::Failure
    }
}

/// Errors surfaced by step handlers and page primitives.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Target not found on page: {target}")]
    ActionTargetNotFound { target: String },

    #[error("Host reported validation errors: {}", messages.join("; "))]
    ValidationBlocked { messages: Vec<String> },

    #[error("Failed to fetch external asset: {detail}")]
    ExternalFetchFailure { detail: String },

    #[error("Timed out after {waited:?} waiting for {target}")]
    PhaseTimeout { target: String, waited: Duration },

    #[error("Page navigated away during wait (started on {origin}, now {current})")]
    Cancelled { origin: String, current: String },

    #[error(transparent)]
    Sink(#[from] ActionError),
}
