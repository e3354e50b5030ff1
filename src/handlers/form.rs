//! Listing form fill.
//!
//! Each field fill is attempted independently; one broken field never
//! aborts the rest, and per-field completion flags record exactly what
//! landed. The language selector is the one required sub-fill: leaving it
//! unset breaks publishing on the host side, so failure to resolve it
//! fails the whole step with a visible warning instead of silently
//! proceeding.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::page::{markers, EnvSnapshot};
use crate::sink::NoticeLevel;
use crate::workflow::outcome::{StepError, StepOutcome};

use super::matching::resolve_required_select;
use super::{targets, StepContext, StepHandler};

/// Values accepted outright for the language selector.
const LANGUAGE_VALUE_WHITELIST: &[&str] = &["en", "en_us"];
/// Labels accepted case-insensitively when no whitelisted value exists.
const LANGUAGE_LABEL_WHITELIST: &[&str] = &["english"];

pub struct FormFillHandler;

impl FormFillHandler {
    /// Fill one field, recording the flag either way. Errors are
    /// per-field; they never propagate past this sub-fill.
    async fn fill_field(ctx: &StepContext<'_>, field: &str, flag: &str, value: &str) {
        if value.trim().is_empty() {
            debug!(field, "Skipping empty field value");
            return;
        }
        match ctx.sink.set_field(field, value).await {
            Ok(()) => ctx.set_flag(flag, true),
            Err(err) => {
                warn!(field, "Field fill failed: {err}");
                ctx.set_flag(flag, false);
            }
        }
    }

    async fn set_condition(ctx: &StepContext<'_>, snapshot: &EnvSnapshot) {
        let Some(condition) = ctx.payload.condition.as_deref() else {
            return;
        };
        let options = snapshot.options_for(targets::CONDITION_FIELD);
        let matched = options
            .iter()
            .find(|o| o.label.eq_ignore_ascii_case(condition));

        match matched {
            Some(option) => {
                let ok = ctx
                    .sink
                    .select_option(targets::CONDITION_FIELD, &option.value)
                    .await
                    .is_ok();
                ctx.set_flag("condition_set", ok);
            }
            None => {
                debug!(condition, "No rendered condition option matched");
                ctx.set_flag("condition_set", false);
            }
        }
    }

    /// Resolve and set the required language selector. Returns false when
    /// no tier yields an option or the select itself fails.
    async fn set_language(ctx: &StepContext<'_>, snapshot: &EnvSnapshot) -> bool {
        let options = snapshot.options_for(targets::LANGUAGE_FIELD);
        let Some(option) =
            resolve_required_select(options, LANGUAGE_VALUE_WHITELIST, LANGUAGE_LABEL_WHITELIST)
        else {
            return false;
        };

        ctx.sink
            .select_option(targets::LANGUAGE_FIELD, &option.value)
            .await
            .is_ok()
    }
}

#[async_trait]
impl StepHandler for FormFillHandler {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
        let snapshot = ctx.wait_for_marker(markers::TITLE_INPUT).await?;
        let payload = ctx.payload;

        Self::fill_field(ctx, targets::TITLE_FIELD, "title_filled", &payload.title).await;
        Self::fill_field(ctx, targets::PRICE_FIELD, "price_filled", &payload.price).await;
        Self::fill_field(
            ctx,
            targets::POSTAL_FIELD,
            "postal_filled",
            &payload.postal_code,
        )
        .await;
        Self::fill_field(
            ctx,
            targets::DESCRIPTION_FIELD,
            "description_filled",
            &payload.description,
        )
        .await;

        for (field, value) in &payload.attributes {
            let flag = format!("{}_filled", field.replace('-', "_"));
            Self::fill_field(ctx, field, &flag, value).await;
        }

        Self::set_condition(ctx, &snapshot).await;

        let language_set = Self::set_language(ctx, &snapshot).await;
        ctx.set_flag("language_set", language_set);
        if !language_set {
            ctx.sink
                .show_notice(
                    NoticeLevel::Warning,
                    "Could not set the required language selector; please pick a language and continue manually.",
                )
                .await;
            return Ok(StepOutcome::failure("language selector unresolved"));
        }

        // Host-side validation messages are surfaced, not fatal; the
        // human sees them on the page either way.
        let after = ctx.sink.snapshot().await?;
        if !after.validation_errors.is_empty() {
            let joined = after.validation_errors.join("; ");
            warn!("Host reported validation errors: {joined}");
            ctx.sink
                .show_notice(
                    NoticeLevel::Warning,
                    &format!("The form reported problems: {joined}"),
                )
                .await;
        }

        if let Err(err) = ctx.sink.click(targets::FORM_CONTINUE).await {
            // A blocked continue with rendered validation messages is the
            // host refusing the form, not a missing control.
            if !after.validation_errors.is_empty() {
                return Err(StepError::ValidationBlocked {
                    messages: after.validation_errors,
                });
            }
            return Err(err.into());
        }
        Ok(StepOutcome::success())
    }
}
