//! Region steps: subarea pick and the optional neighborhood pick.
//!
//! Both derive their target label from the payload's postal code through
//! the static tables in [`matching`], then score the rendered candidates.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::workflow::outcome::{StepError, StepOutcome};

use super::matching::{best_match, neighborhood_for_postal, subarea_for_postal};
use super::{targets, StepContext, StepHandler};

pub struct SubareaSelectionHandler;

#[async_trait]
impl StepHandler for SubareaSelectionHandler {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
        let snapshot = ctx
            .wait_until(targets::SUBAREA_GROUP, |snap| {
                !snap.choices_for(targets::SUBAREA_GROUP).is_empty()
            })
            .await?;
        let candidates = snapshot.choices_for(targets::SUBAREA_GROUP);

        let target = subarea_for_postal(&ctx.payload.postal_code);
        let selected = target
            .and_then(|label| best_match(label, candidates.iter().map(String::as_str)))
            // No mapping or no score: the first rendered subarea is the
            // designated default.
            .or_else(|| candidates.first().map(String::as_str));

        let Some(label) = selected else {
            return Ok(StepOutcome::failure("no subarea choices rendered"));
        };

        info!(subarea = label, "Selecting subarea");
        ctx.sink
            .click_choice(targets::SUBAREA_GROUP, label)
            .await?;
        ctx.set_flag("subarea_selected", true);
        Ok(StepOutcome::success_with(label))
    }
}

pub struct HoodSelectionHandler;

#[async_trait]
impl StepHandler for HoodSelectionHandler {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
        let Some(hood) = neighborhood_for_postal(&ctx.payload.postal_code) else {
            debug!(
                postal_code = %ctx.payload.postal_code,
                "No neighborhood mapping for postal code"
            );
            return Ok(StepOutcome::skipped("no neighborhood mapping"));
        };

        let snapshot = ctx
            .wait_until(targets::HOOD_GROUP, |snap| {
                !snap.choices_for(targets::HOOD_GROUP).is_empty()
            })
            .await?;
        let candidates = snapshot.choices_for(targets::HOOD_GROUP);

        let Some(label) = best_match(hood, candidates.iter().map(String::as_str)) else {
            return Ok(StepOutcome::failure(format!(
                "no rendered neighborhood matched '{hood}'"
            )));
        };

        info!(hood = label, "Selecting neighborhood");
        ctx.sink.click_choice(targets::HOOD_GROUP, label).await?;
        ctx.set_flag("hood_selected", true);
        Ok(StepOutcome::success_with(label))
    }
}
