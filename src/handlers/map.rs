//! Map confirmation step: accept the position derived from the postal
//! code. Skippable; the wizard only shows it for some categories.

use async_trait::async_trait;
use tracing::debug;

use crate::page::markers;
use crate::workflow::outcome::{StepError, StepOutcome};

use super::{targets, StepContext, StepHandler};

pub struct MapLocationHandler;

#[async_trait]
impl StepHandler for MapLocationHandler {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
        ctx.wait_for_marker(markers::MAP_CANVAS).await?;

        debug!("Confirming prefilled map position");
        ctx.sink.click(targets::MAP_CONTINUE).await?;
        ctx.set_flag("map_confirmed", true);
        Ok(StepOutcome::success())
    }
}
