//! Workflow engine: phases, retry policy, and the orchestrator that
//! drives one step per page load.

pub mod orchestrator;
pub mod outcome;
pub mod phase;
pub mod probe;
pub mod retry;
pub mod run;

pub use orchestrator::{RunReport, WorkflowOrchestrator, WorkflowStatus};
pub use outcome::{StepError, StepOutcome};
pub use phase::Phase;
pub use probe::EnvironmentProbe;
pub use retry::{RetryExecutor, RetryPolicy};
pub use run::{ListingPayload, MAX_ATTEMPTS};
