//! Entry step: kick the wizard off from the posting landing page.

use async_trait::async_trait;
use tracing::debug;

use crate::page::markers;
use crate::workflow::outcome::{StepError, StepOutcome};

use super::{targets, StepContext, StepHandler};

pub struct InitialPageHandler;

#[async_trait]
impl StepHandler for InitialPageHandler {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
        ctx.wait_for_marker(markers::POSTING_LANDING).await?;

        debug!("Posting landing detected, entering the wizard");
        ctx.sink.click(targets::CREATE_POSTING_LINK).await?;
        ctx.set_flag("wizard_entered", true);

        Ok(StepOutcome::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::EnvSnapshot;
    use crate::sink::fake::{FakeSink, RecordedAction};
    use crate::workflow::run::ListingPayload;
    use std::time::Duration;

    fn ctx_parts() -> (ListingPayload, super::super::PollSettings) {
        (
            ListingPayload::default(),
            super::super::PollSettings {
                timeout: Duration::from_millis(20),
                tick: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn test_clicks_create_posting() {
        let (payload, poll) = ctx_parts();
        let snapshot = EnvSnapshot {
            location: "https://post.example.org/".to_string(),
            markers: [markers::POSTING_LANDING.to_string()].into_iter().collect(),
            ..Default::default()
        };
        let sink = FakeSink::new(snapshot);
        let ctx = StepContext::new(&payload, &sink, poll);

        let outcome = InitialPageHandler.execute(&ctx).await.unwrap();
        assert!(outcome.is_success());
        assert!(sink.recorded().contains(&RecordedAction::Click {
            target: targets::CREATE_POSTING_LINK.to_string(),
        }));
        assert_eq!(ctx.take_flags().get("wizard_entered"), Some(&true));
    }

    #[tokio::test]
    async fn test_missing_landing_times_out() {
        let (payload, poll) = ctx_parts();
        let sink = FakeSink::new(EnvSnapshot::default());
        let ctx = StepContext::new(&payload, &sink, poll);

        let err = InitialPageHandler.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, StepError::PhaseTimeout { .. }));
    }
}
