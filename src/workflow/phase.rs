//! Workflow phases for the posting wizard.
//!
//! Phases are linearly ordered but the wizard may skip `HoodSelection`,
//! `MapLocation`, and `Preview` depending on what the host decides to
//! render. `Completed` and `Error` are terminal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One discrete step of the external posting wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    InitialPage,
    SubareaSelection,
    HoodSelection,
    TypeSelection,
    CategorySelection,
    FormFill,
    ImageUpload,
    MapLocation,
    Preview,
    Publishing,
    Completed,
    Error,
}

impl Phase {
    /// Ordinal position in the wizard, used to enforce forward-only
    /// transitions. Terminal phases sort after everything else.
    pub fn ordinal(&self) -> u8 {
        match self {
            Phase::Idle => 0,
            Phase::InitialPage => 1,
            Phase::SubareaSelection => 2,
            Phase::HoodSelection => 3,
            Phase::TypeSelection => 4,
            Phase::CategorySelection => 5,
            Phase::FormFill => 6,
            Phase::ImageUpload => 7,
            Phase::MapLocation => 8,
            Phase::Preview => 9,
            Phase::Publishing => 10,
            Phase::Completed => 11,
            Phase::Error => 12,
        }
    }

    /// Whether this phase absorbs the run: no further dispatch once reached.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Error)
    }

    /// Whether the wizard may skip this phase entirely.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Phase::HoodSelection | Phase::MapLocation | Phase::Preview
        )
    }

    /// Fixed progress percent reported for this phase (not time-derived).
    pub fn progress_percent(&self) -> u8 {
        match self {
            Phase::Idle => 0,
            Phase::InitialPage => 5,
            Phase::SubareaSelection => 10,
            Phase::HoodSelection => 15,
            Phase::TypeSelection => 20,
            Phase::CategorySelection => 30,
            Phase::FormFill => 50,
            Phase::ImageUpload => 65,
            Phase::MapLocation => 75,
            Phase::Preview => 85,
            Phase::Publishing => 95,
            Phase::Completed | Phase::Error => 100,
        }
    }

    /// Map the wizard's `s=` step parameter to a phase.
    ///
    /// Returns `None` for unknown values; the caller falls back to marker
    /// scanning.
    pub fn from_step_param(value: &str) -> Option<Phase> {
        match value {
            "subarea" => Some(Phase::SubareaSelection),
            "hood" => Some(Phase::HoodSelection),
            "type" => Some(Phase::TypeSelection),
            "cat" => Some(Phase::CategorySelection),
            "edit" => Some(Phase::FormFill),
            "editimage" => Some(Phase::ImageUpload),
            "geoverify" => Some(Phase::MapLocation),
            "preview" => Some(Phase::Preview),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` goes forward (or stays put).
    pub fn allows_transition_to(&self, next: Phase) -> bool {
        next.ordinal() >= self.ordinal()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::InitialPage => "initial_page",
            Phase::SubareaSelection => "subarea_selection",
            Phase::HoodSelection => "hood_selection",
            Phase::TypeSelection => "type_selection",
            Phase::CategorySelection => "category_selection",
            Phase::FormFill => "form_fill",
            Phase::ImageUpload => "image_upload",
            Phase::MapLocation => "map_location",
            Phase::Preview => "preview",
            Phase::Publishing => "publishing",
            Phase::Completed => "completed",
            Phase::Error => "error",
        };
        write!(f, "{}", name)
    }
}
