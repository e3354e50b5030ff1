//! Preview step: submit the listing from the preview pane.

use async_trait::async_trait;
use tracing::debug;

use crate::page::markers;
use crate::workflow::outcome::{StepError, StepOutcome};

use super::{targets, StepContext, StepHandler};

pub struct PreviewHandler;

#[async_trait]
impl StepHandler for PreviewHandler {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
        ctx.wait_for_marker(markers::PREVIEW_PANE).await?;

        debug!("Publishing from preview");
        ctx.sink.click(targets::PREVIEW_PUBLISH).await?;
        ctx.set_flag("preview_submitted", true);
        Ok(StepOutcome::success())
    }
}
