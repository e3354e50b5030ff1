//! Retry policies and the executor that wraps step invocations.
//!
//! Hard policies propagate failure after bounded retries; soft policies
//! swallow it, emit a warning, and let the workflow move on. Both use
//! exponential backoff capped at a fixed delay.

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::sink::{ActionSink, NoticeLevel};

use super::outcome::{StepError, StepOutcome};
use super::phase::Phase;

/// Failure criticality for a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryKind {
    /// Exhaustion propagates; the phase is required.
    Hard,
    /// Exhaustion is downgraded to a warning; the phase is optional.
    Soft,
}

/// Retry tuning for one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub kind: RetryKind,
    /// Total invocations allowed, including the first.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub backoff_factor: f32,
    pub delay_cap: Duration,
}

impl RetryPolicy {
    /// Standard policy for required phases: two attempts, 1s base delay.
    pub fn hard() -> Self {
        Self {
            kind: RetryKind::Hard,
            max_attempts: 2,
            base_delay: Duration::from_millis(1000),
            backoff_factor: 1.2,
            delay_cap: Duration::from_millis(3000),
        }
    }

    /// Required phase that must only ever run once per page load (form
    /// fill performs many independent sub-fills).
    pub fn hard_single() -> Self {
        Self {
            max_attempts: 1,
            ..Self::hard()
        }
    }

    /// Standard policy for optional phases: one attempt, then move on.
    pub fn soft() -> Self {
        Self {
            kind: RetryKind::Soft,
            max_attempts: 1,
            base_delay: Duration::from_millis(800),
            backoff_factor: 1.2,
            delay_cap: Duration::from_millis(3000),
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_factor(self.backoff_factor)
            .with_max_delay(self.delay_cap)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }
}

/// A required phase ran out of attempts; the orchestrator turns this into
/// the terminal `Error` phase.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Phase {phase} failed after {attempts} attempt(s): {detail}")]
pub struct RetryExhausted {
    pub phase: Phase,
    pub attempts: usize,
    pub detail: String,
}

enum AttemptFailure {
    Outcome(StepOutcome),
    Error(StepError),
}

impl AttemptFailure {
    fn detail(&self) -> String {
        match self {
            AttemptFailure::Outcome(outcome) => outcome
                .detail
                .clone()
                .unwrap_or_else(|| "step reported failure".to_string()),
            AttemptFailure::Error(err) => err.to_string(),
        }
    }
}

/// Wraps a step invocation with the phase's retry policy.
pub struct RetryExecutor;

impl RetryExecutor {
    /// Run `op` under `policy`.
    ///
    /// A `Failure` outcome and a handler error are both treated as a
    /// failed attempt. On hard exhaustion the last failure propagates and
    /// a phase-named notice is shown; on soft exhaustion the failure is
    /// swallowed and a neutral `Skipped` outcome comes back so the caller
    /// can persist and move on.
    pub async fn execute<F, Fut>(
        phase: Phase,
        policy: &RetryPolicy,
        sink: &dyn ActionSink,
        op: F,
    ) -> Result<StepOutcome, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<StepOutcome, StepError>>,
    {
        let mut op = op;
        let attempt = || {
            let fut = op();
            async move {
                match fut.await {
                    Ok(outcome) if outcome.is_failure() => Err(AttemptFailure::Outcome(outcome)),
                    Ok(outcome) => Ok(outcome),
                    Err(err) => Err(AttemptFailure::Error(err)),
                }
            }
        };

        let result = attempt
            .retry(policy.backoff())
            .notify(|err: &AttemptFailure, delay| {
                warn!(
                    phase = %phase,
                    delay_ms = delay.as_millis() as u64,
                    "Step failed, retrying: {}",
                    err.detail()
                );
            })
            .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(failure) => {
                let detail = failure.detail();
                match policy.kind {
                    RetryKind::Hard => {
                        sink.show_notice(
                            NoticeLevel::Error,
                            &format!(
                                "Step '{}' failed: {}. Please complete it manually.",
                                phase, detail
                            ),
                        )
                        .await;
                        Err(RetryExhausted {
                            phase,
                            attempts: policy.max_attempts,
                            detail,
                        })
                    }
                    RetryKind::Soft => {
                        info!(phase = %phase, "Optional step exhausted retries, moving on");
                        sink.show_notice(
                            NoticeLevel::Warning,
                            &format!(
                                "Optional step '{}' was skipped: {}. You can finish it manually.",
                                phase, detail
                            ),
                        )
                        .await;
                        Ok(StepOutcome::skipped(detail))
                    }
                }
            }
        }
    }
}
