//! Posting type and category picks.

use async_trait::async_trait;
use tracing::info;

use crate::workflow::outcome::{StepError, StepOutcome};

use super::matching::{best_match, infer_category, DEFAULT_CATEGORY};
use super::{targets, StepContext, StepHandler};

/// Posting type offered to private sellers.
const POSTING_TYPE_LABEL: &str = "for sale by owner";

pub struct TypeSelectionHandler;

#[async_trait]
impl StepHandler for TypeSelectionHandler {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
        let snapshot = ctx
            .wait_until(targets::TYPE_GROUP, |snap| {
                !snap.choices_for(targets::TYPE_GROUP).is_empty()
            })
            .await?;
        let candidates = snapshot.choices_for(targets::TYPE_GROUP);

        let Some(label) = best_match(POSTING_TYPE_LABEL, candidates.iter().map(String::as_str))
        else {
            return Ok(StepOutcome::failure(format!(
                "no posting type matched '{POSTING_TYPE_LABEL}'"
            )));
        };

        info!(posting_type = label, "Selecting posting type");
        ctx.sink.click_choice(targets::TYPE_GROUP, label).await?;
        ctx.set_flag("type_selected", true);
        Ok(StepOutcome::success_with(label))
    }
}

pub struct CategorySelectionHandler;

impl CategorySelectionHandler {
    /// Category the payload asks for, else a keyword inference from the
    /// title, else the catch-all default.
    fn target_category(ctx: &StepContext<'_>) -> String {
        ctx.payload
            .category
            .clone()
            .or_else(|| infer_category(&ctx.payload.title).map(String::from))
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
    }
}

#[async_trait]
impl StepHandler for CategorySelectionHandler {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
        let snapshot = ctx
            .wait_until(targets::CATEGORY_GROUP, |snap| {
                !snap.choices_for(targets::CATEGORY_GROUP).is_empty()
            })
            .await?;
        let candidates = snapshot.choices_for(targets::CATEGORY_GROUP);

        let target = Self::target_category(ctx);
        let selected = best_match(&target, candidates.iter().map(String::as_str))
            .or_else(|| best_match(DEFAULT_CATEGORY, candidates.iter().map(String::as_str)));

        let Some(label) = selected else {
            return Ok(StepOutcome::failure(format!(
                "no rendered category matched '{target}' or the default"
            )));
        };

        info!(category = label, wanted = %target, "Selecting category");
        ctx.sink
            .click_choice(targets::CATEGORY_GROUP, label)
            .await?;
        ctx.set_flag("category_selected", true);
        Ok(StepOutcome::success_with(label))
    }
}
