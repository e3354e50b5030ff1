//! Image attach step.
//!
//! Attachments are isolated from each other the same way form fields
//! are: a single bad asset never blocks the remaining images, and the
//! phase itself is soft.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::page::markers;
use crate::sink::ActionError;
use crate::workflow::outcome::{StepError, StepOutcome};

use super::{targets, StepContext, StepHandler};

pub struct ImageUploadHandler;

#[async_trait]
impl StepHandler for ImageUploadHandler {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
        if ctx.payload.images.is_empty() {
            ctx.set_flag("images_attached", true);
            ctx.sink.click(targets::IMAGES_DONE).await?;
            return Ok(StepOutcome::skipped("no images in payload"));
        }

        ctx.wait_for_marker(markers::IMAGE_UPLOAD_WIDGET).await?;

        let mut failures = Vec::new();
        for (index, source) in ctx.payload.images.iter().enumerate() {
            match ctx.sink.attach_image(source).await {
                Ok(()) => {
                    info!(index, source, "Attached image");
                }
                Err(ActionError::AssetFetch { asset, reason }) => {
                    warn!(asset, "Image asset could not be fetched: {reason}");
                    failures.push(format!("{asset}: {reason}"));
                }
                Err(err) => {
                    warn!(source, "Image attach failed: {err}");
                    failures.push(format!("{source}: {err}"));
                }
            }
        }

        let attached = ctx.payload.images.len() - failures.len();
        ctx.set_flag("images_attached", failures.is_empty());

        // Nothing attached at all: classify instead of continuing with an
        // imageless listing the seller did not ask for.
        if attached == 0 {
            return Err(StepError::ExternalFetchFailure {
                detail: failures.join("; "),
            });
        }

        ctx.sink.click(targets::IMAGES_DONE).await?;

        if failures.is_empty() {
            Ok(StepOutcome::success_with(format!(
                "{attached} image(s) attached"
            )))
        } else {
            Ok(StepOutcome::failure(format!(
                "{attached} attached, {} failed: {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }
}
