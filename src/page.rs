//! Snapshot of the rendered host page.
//!
//! The core never touches the live page directly; the page-side agent
//! captures an `EnvSnapshot` per observation and concrete effects go
//! through the [`ActionSink`](crate::sink::ActionSink). Snapshots are plain
//! values so phase detection stays pure and testable.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Structural marker ids the page-side agent knows how to recognize.
pub mod markers {
    pub const POSTING_LANDING: &str = "posting-landing";
    pub const TITLE_INPUT: &str = "title-input";
    pub const CATEGORY_PICKER: &str = "category-picker";
    pub const IMAGE_UPLOAD_WIDGET: &str = "image-upload-widget";
    pub const MAP_CANVAS: &str = "map-canvas";
    pub const PREVIEW_PANE: &str = "preview-pane";
    pub const PUBLISH_CONFIRMATION: &str = "publish-confirmation";
}

/// One option of a rendered `<select>` control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }

    /// Placeholder options carry no value or a dash-only label.
    pub fn is_placeholder(&self) -> bool {
        let label = self.label.trim();
        self.value.trim().is_empty() || label.is_empty() || label.chars().all(|c| c == '-')
    }
}

/// A point-in-time capture of the rendered page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvSnapshot {
    /// Full location URL at capture time.
    #[serde(default)]
    pub location: String,

    /// Structural markers present on the page (see [`markers`]).
    #[serde(default)]
    pub markers: HashSet<String>,

    /// Visible text content, lowercased comparisons are the caller's job.
    #[serde(default)]
    pub body_text: String,

    /// Select-control options keyed by field id.
    #[serde(default)]
    pub select_options: HashMap<String, Vec<SelectOption>>,

    /// Clickable candidate labels keyed by group id (category links,
    /// region radio labels, and similar).
    #[serde(default)]
    pub choice_labels: HashMap<String, Vec<String>>,

    /// Host-reported form validation messages, if any are rendered.
    #[serde(default)]
    pub validation_errors: Vec<String>,
}

impl EnvSnapshot {
    /// Extract a query parameter from the captured location.
    ///
    /// Tolerates malformed locations; absence and parse trouble both
    /// read as `None`.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        let query = self.location.split_once('?')?.1;
        let query = query.split('#').next().unwrap_or(query);
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name && !value.is_empty()).then_some(value)
        })
    }

    /// Host component of the captured location, used to validate persisted
    /// state against the page we are actually on.
    pub fn host(&self) -> Option<&str> {
        let rest = self.location.split_once("://")?.1;
        let host = rest.split(['/', '?', '#']).next()?;
        (!host.is_empty()).then_some(host)
    }

    pub fn has_marker(&self, marker: &str) -> bool {
        self.markers.contains(marker)
    }

    pub fn options_for(&self, field: &str) -> &[SelectOption] {
        self.select_options
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn choices_for(&self, group: &str) -> &[String] {
        self.choice_labels
            .get(group)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Case-insensitive body text search.
    pub fn body_contains(&self, phrase: &str) -> bool {
        self.body_text
            .to_lowercase()
            .contains(&phrase.to_lowercase())
    }
}
