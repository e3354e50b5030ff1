//! Phase detection from external page signals.
//!
//! The probe is deterministic, total, and side-effect-free: the
//! orchestrator always re-derives the phase from the environment instead
//! of trusting whatever a previous page lifetime remembered.

use crate::page::{markers, EnvSnapshot};

use super::phase::Phase;

/// One fallback rule: a structural marker implies a phase.
#[derive(Debug, Clone)]
pub struct MarkerRule {
    pub marker: String,
    pub phase: Phase,
}

impl MarkerRule {
    pub fn new(marker: impl Into<String>, phase: Phase) -> Self {
        Self {
            marker: marker.into(),
            phase,
        }
    }
}

/// Maps external signals to the current [`Phase`].
///
/// Primary signal is the wizard step parameter in the location; the
/// fallback is a prioritized marker list evaluated in order. Rules are
/// injectable so tests can supply their own without a rendered page.
pub struct EnvironmentProbe {
    rules: Vec<MarkerRule>,
}

impl Default for EnvironmentProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentProbe {
    /// Probe with the standard marker priority order.
    pub fn new() -> Self {
        Self {
            rules: vec![
                MarkerRule::new(markers::PUBLISH_CONFIRMATION, Phase::Publishing),
                MarkerRule::new(markers::TITLE_INPUT, Phase::FormFill),
                MarkerRule::new(markers::CATEGORY_PICKER, Phase::CategorySelection),
                MarkerRule::new(markers::IMAGE_UPLOAD_WIDGET, Phase::ImageUpload),
                MarkerRule::new(markers::MAP_CANVAS, Phase::MapLocation),
                MarkerRule::new(markers::PREVIEW_PANE, Phase::Preview),
                MarkerRule::new(markers::POSTING_LANDING, Phase::InitialPage),
            ],
        }
    }

    pub fn with_rules(rules: Vec<MarkerRule>) -> Self {
        Self { rules }
    }

    /// Detect the current phase. Total: any input maps to some phase and
    /// unknown environments read as `Idle`.
    pub fn detect(&self, env: &EnvSnapshot) -> Phase {
        if let Some(step) = env.query_param("s") {
            if let Some(phase) = Phase::from_step_param(step) {
                return phase;
            }
        }

        for rule in &self.rules {
            if env.has_marker(&rule.marker) {
                return rule.phase;
            }
        }

        Phase::Idle
    }
}
