//! Top-level workflow controller.
//!
//! One invocation per page load: load persisted state, re-derive the
//! phase from the environment, dispatch the matching handler under its
//! retry policy, persist what happened. The orchestrator never trusts a
//! remembered phase; the environment is the source of truth, which is
//! what keeps every step re-enterable after a cold start.

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::handlers::{HandlerRegistry, PollSettings, StepContext, REQUIRES_CONFIRMATION_FLAG};
use crate::progress::ProgressReporter;
use crate::sink::{ActionSink, NoticeLevel};
use crate::state::{PersistedRun, RunStatePatch, StateStore};

use super::outcome::StepOutcome;
use super::phase::Phase;
use super::probe::EnvironmentProbe;
use super::retry::RetryExecutor;
use super::run::{ListingPayload, MAX_ATTEMPTS};

/// What one orchestrator invocation did.
#[derive(Debug, Clone, PartialEq)]
pub enum RunReport {
    /// Another invocation is already driving this page lifetime.
    Busy,
    /// The run already reached an absorbing phase; nothing dispatched.
    Terminal(Phase),
    /// The attempt ceiling was exceeded; the run is now `Error`.
    AttemptLimitExceeded,
    /// No handler is registered for the detected phase; nothing dispatched.
    NoHandler(Phase),
    /// A handler ran and the run continues.
    Dispatched { phase: Phase, outcome: StepOutcome },
    /// A required phase exhausted its retries; the run is now `Error`.
    PhaseFailed { phase: Phase, detail: String },
}

/// Snapshot of the persisted run for status queries.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WorkflowStatus {
    pub phase: Phase,
    pub completion_flags: BTreeMap<String, bool>,
    pub attempt_count: u32,
}

pub struct WorkflowOrchestrator {
    probe: EnvironmentProbe,
    registry: HandlerRegistry,
    store: Arc<dyn StateStore>,
    reporter: ProgressReporter,
    poll: PollSettings,
    running: AtomicBool,
}

impl WorkflowOrchestrator {
    pub fn new(
        probe: EnvironmentProbe,
        registry: HandlerRegistry,
        store: Arc<dyn StateStore>,
        reporter: ProgressReporter,
        poll: PollSettings,
    ) -> Self {
        Self {
            probe,
            registry,
            store,
            reporter,
            poll,
            running: AtomicBool::new(false),
        }
    }

    /// Current persisted status, for `GET_STATUS`.
    pub fn status(&self) -> Result<Option<WorkflowStatus>> {
        Ok(self.store.load()?.map(|record| WorkflowStatus {
            phase: record.workflow_phase,
            completion_flags: record.completion_flags,
            attempt_count: record.attempt_count,
        }))
    }

    /// Drive one page-load cycle for `payload`.
    pub async fn run(
        &self,
        payload: &ListingPayload,
        sink: Arc<dyn ActionSink>,
    ) -> Result<RunReport> {
        // One orchestrator per page lifetime; duplicate triggers from the
        // host must not double-submit a phase.
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Duplicate run trigger ignored, workflow already active");
            return Ok(RunReport::Busy);
        }
        let result = self.run_inner(payload, sink).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(
        &self,
        payload: &ListingPayload,
        sink: Arc<dyn ActionSink>,
    ) -> Result<RunReport> {
        let snapshot = sink.snapshot().await?;
        let host = snapshot.host();

        // Load what survived the reload, discarding anything persisted
        // for a different payload or a different posting host.
        let mut record = match self.store.load()? {
            Some(record) if record.matches(payload, host) => record,
            Some(_) => {
                info!("Persisted run state is stale, starting fresh");
                self.store.clear()?;
                let record = PersistedRun::new(payload, host);
                self.store.save(&record)?;
                record
            }
            None => {
                let record = PersistedRun::new(payload, host);
                self.store.save(&record)?;
                record
            }
        };

        if record.workflow_phase.is_terminal() {
            debug!(phase = %record.workflow_phase, "Run already terminal, nothing to do");
            return Ok(RunReport::Terminal(record.workflow_phase));
        }

        if record.attempts_exhausted() {
            return self.fail_attempt_limit(&record).await;
        }

        let phase = self.probe.detect(&snapshot);
        debug!(phase = %phase, location = %snapshot.location, "Phase detected");

        // A fresh wizard entry is a full workflow restart.
        if phase == Phase::InitialPage {
            record.attempt_count += 1;
            self.store.patch(RunStatePatch {
                attempt_count: Some(record.attempt_count),
                ..Default::default()
            })?;
            if record.attempts_exhausted() {
                return self.fail_attempt_limit(&record).await;
            }
        }

        let Some((handler, policy)) = self.registry.get(phase) else {
            // Unrecognized or idle: say so and stop. Retrying an unknown
            // phase is how infinite reload loops happen.
            info!(phase = %phase, "No handler for phase, standing by");
            sink.show_notice(
                NoticeLevel::Info,
                "No posting step recognized on this page; nothing to automate.",
            )
            .await;
            return Ok(RunReport::NoHandler(phase));
        };

        self.reporter
            .phase_progress(phase, format!("running step '{phase}'"));

        let ctx = StepContext::new(payload, sink.as_ref(), self.poll);
        let handler = Arc::clone(handler);
        let result =
            RetryExecutor::execute(phase, policy, sink.as_ref(), || handler.execute(&ctx)).await;
        let flags = ctx.take_flags();

        match result {
            Ok(outcome) => {
                let next_phase = if phase == Phase::Publishing && outcome.is_success() {
                    Phase::Completed
                } else {
                    phase
                };
                // Phase only ever moves forward in the persisted record.
                let persisted_phase = record
                    .workflow_phase
                    .allows_transition_to(next_phase)
                    .then_some(next_phase);
                self.store.patch(RunStatePatch {
                    workflow_phase: persisted_phase,
                    completion_flags: Some(flags.clone()),
                    posting_host: host.map(String::from),
                    ..Default::default()
                })?;

                if next_phase == Phase::Completed {
                    let requires_confirmation = flags
                        .get(REQUIRES_CONFIRMATION_FLAG)
                        .copied()
                        .unwrap_or(false);
                    info!(requires_confirmation, "Workflow completed");
                    self.reporter
                        .phase_progress(Phase::Completed, "listing published");
                    self.reporter.posting_complete(requires_confirmation);
                }

                Ok(RunReport::Dispatched { phase, outcome })
            }
            Err(exhausted) => {
                // Required phase out of retries: park the run in `Error`
                // and hand the wheel to the human. No rethrow.
                self.store.patch(RunStatePatch {
                    workflow_phase: Some(Phase::Error),
                    completion_flags: Some(flags),
                    ..Default::default()
                })?;
                self.reporter.posting_error(exhausted.to_string());
                Ok(RunReport::PhaseFailed {
                    phase,
                    detail: exhausted.detail,
                })
            }
        }
    }

    /// Force the run into `Error` for exceeding the attempt ceiling.
    /// Reported exactly once: the next invocation sees a terminal phase.
    async fn fail_attempt_limit(&self, record: &PersistedRun) -> Result<RunReport> {
        warn!(
            attempts = record.attempt_count,
            max = MAX_ATTEMPTS,
            "Attempt limit exceeded, giving up"
        );
        self.store.patch(RunStatePatch::phase(Phase::Error))?;
        self.reporter.posting_error(format!(
            "Gave up after {MAX_ATTEMPTS} attempts; please finish the posting manually."
        ));
        Ok(RunReport::AttemptLimitExceeded)
    }
}
