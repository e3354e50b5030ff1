//! Publish confirmation detection.
//!
//! The wizard's final page carries no reliable step parameter, so this
//! handler polls the rendered text for a fixed, case-insensitive phrase
//! set. A distinct phrase subset mentioning email confirmation is an
//! alternate success path: the listing is live pending a click in the
//! seller's inbox.

use async_trait::async_trait;
use tracing::info;

use crate::page::EnvSnapshot;
use crate::workflow::outcome::{StepError, StepOutcome};

use super::{StepContext, StepHandler};

/// Flag the orchestrator reads to tag the completion event.
pub const REQUIRES_CONFIRMATION_FLAG: &str = "requires_confirmation";

/// Phrases that mean the listing is published.
const SUCCESS_PHRASES: &[&str] = &[
    "thanks for posting",
    "your posting can be seen at",
    "posting has been published",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PublishSignal {
    Published,
    NeedsEmailConfirmation,
}

fn detect_signal(snapshot: &EnvSnapshot) -> Option<PublishSignal> {
    if snapshot.body_contains("email")
        && (snapshot.body_contains("confirm") || snapshot.body_contains("verify"))
    {
        return Some(PublishSignal::NeedsEmailConfirmation);
    }
    if SUCCESS_PHRASES
        .iter()
        .any(|phrase| snapshot.body_contains(phrase))
    {
        return Some(PublishSignal::Published);
    }
    None
}

pub struct PublishingHandler;

#[async_trait]
impl StepHandler for PublishingHandler {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
        let snapshot = ctx
            .wait_until("publish confirmation text", |snap| {
                detect_signal(snap).is_some()
            })
            .await?;

        match detect_signal(&snapshot) {
            Some(PublishSignal::Published) => {
                info!("Publish confirmed");
                ctx.set_flag(REQUIRES_CONFIRMATION_FLAG, false);
                Ok(StepOutcome::success_with("published"))
            }
            Some(PublishSignal::NeedsEmailConfirmation) => {
                info!("Publish confirmed, email confirmation pending");
                ctx.set_flag(REQUIRES_CONFIRMATION_FLAG, true);
                Ok(StepOutcome::success_with("published, confirm via email"))
            }
            // wait_until only returns once a signal is present.
            None => Ok(StepOutcome::failure("confirmation text disappeared")),
        }
    }
}
