//! Action sink: the collaborator that touches the live page.
//!
//! The engine decides *what* to do; the sink performs the primitive effect
//! (fill a field, click a control, attach an image) and reports whether it
//! worked. The channel binary backs this with the page-side agent; tests
//! use scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::page::EnvSnapshot;

/// Severity of a user-visible transient notice shown on the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A primitive action failed on the page side.
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("No element matched {target}")]
    TargetNotFound { target: String },

    #[error("Action on {target} was rejected: {reason}")]
    Rejected { target: String, reason: String },

    #[error("Could not fetch asset {asset}: {reason}")]
    AssetFetch { asset: String, reason: String },

    #[error("Channel to the page agent is closed")]
    ChannelClosed,
}

/// Contract for performing concrete effects on the rendered page.
///
/// Every method resolves to success or a reported failure; the sink never
/// retries on its own. `snapshot` is the one observation primitive: it is
/// how handlers see a fresh view of the page between effects.
#[async_trait]
pub trait ActionSink: Send + Sync {
    /// Capture a fresh snapshot of the page as rendered right now.
    async fn snapshot(&self) -> Result<EnvSnapshot, ActionError>;

    /// Set the value of an input or textarea identified by `field`.
    async fn set_field(&self, field: &str, value: &str) -> Result<(), ActionError>;

    /// Click the control identified by `target`.
    async fn click(&self, target: &str) -> Result<(), ActionError>;

    /// Click the choice with the given visible label within a choice group.
    async fn click_choice(&self, group: &str, label: &str) -> Result<(), ActionError>;

    /// Select the option with the given value in a `<select>` control.
    async fn select_option(&self, field: &str, value: &str) -> Result<(), ActionError>;

    /// Attach an image to the upload widget from a local path or URL.
    async fn attach_image(&self, source: &str) -> Result<(), ActionError>;

    /// Show a transient user-visible notice on the page. Fire-and-forget;
    /// the engine never fails because a notice could not be shown.
    async fn show_notice(&self, level: NoticeLevel, text: &str);
}


pub mod fake {
    //! Scripted sink for unit and integration tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Record of one effect performed through the fake.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RecordedAction {
        SetField { field: String, value: String },
        Click { target: String },
        ClickChoice { group: String, label: String },
        SelectOption { field: String, value: String },
        AttachImage { source: String },
        Notice { level: NoticeLevel, text: String },
    }

    /// In-memory sink that serves scripted snapshots and records effects.
    pub struct FakeSink {
        snapshot: Mutex<EnvSnapshot>,
        /// Snapshots served first, in order, before the steady-state one.
        queued: Mutex<Vec<EnvSnapshot>>,
        pub actions: Mutex<Vec<RecordedAction>>,
        /// Targets that should fail when acted on, with the error to raise.
        pub failing_targets: Mutex<HashMap<String, ActionError>>,
    }

    impl FakeSink {
        pub fn new(snapshot: EnvSnapshot) -> Self {
            Self {
                snapshot: Mutex::new(snapshot),
                queued: Mutex::new(Vec::new()),
                actions: Mutex::new(Vec::new()),
                failing_targets: Mutex::new(HashMap::new()),
            }
        }

        pub fn set_snapshot(&self, snapshot: EnvSnapshot) {
            *self.snapshot.lock().unwrap() = snapshot;
        }

        /// Serve these snapshots (in order) before the steady-state one.
        pub fn queue_snapshots(&self, snapshots: Vec<EnvSnapshot>) {
            let mut queued = self.queued.lock().unwrap();
            *queued = snapshots;
            queued.reverse();
        }

        pub fn fail_target(&self, target: &str, err: ActionError) {
            self.failing_targets
                .lock()
                .unwrap()
                .insert(target.to_string(), err);
        }

        pub fn recorded(&self) -> Vec<RecordedAction> {
            self.actions.lock().unwrap().clone()
        }

        pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
            self.recorded()
                .into_iter()
                .filter_map(|a| match a {
                    RecordedAction::Notice { level, text } => Some((level, text)),
                    _ => None,
                })
                .collect()
        }

        fn check(&self, target: &str) -> Result<(), ActionError> {
            match self.failing_targets.lock().unwrap().get(target) {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }

        fn record(&self, action: RecordedAction) {
            self.actions.lock().unwrap().push(action);
        }
    }

    #[async_trait]
    impl ActionSink for FakeSink {
        async fn snapshot(&self) -> Result<EnvSnapshot, ActionError> {
            if let Some(next) = self.queued.lock().unwrap().pop() {
                return Ok(next);
            }
            Ok(self.snapshot.lock().unwrap().clone())
        }

        async fn set_field(&self, field: &str, value: &str) -> Result<(), ActionError> {
            self.check(field)?;
            self.record(RecordedAction::SetField {
                field: field.to_string(),
                value: value.to_string(),
            });
            Ok(())
        }

        async fn click(&self, target: &str) -> Result<(), ActionError> {
            self.check(target)?;
            self.record(RecordedAction::Click {
                target: target.to_string(),
            });
            Ok(())
        }

        async fn click_choice(&self, group: &str, label: &str) -> Result<(), ActionError> {
            self.check(group)?;
            self.record(RecordedAction::ClickChoice {
                group: group.to_string(),
                label: label.to_string(),
            });
            Ok(())
        }

        async fn select_option(&self, field: &str, value: &str) -> Result<(), ActionError> {
            self.check(field)?;
            self.record(RecordedAction::SelectOption {
                field: field.to_string(),
                value: value.to_string(),
            });
            Ok(())
        }

        async fn attach_image(&self, source: &str) -> Result<(), ActionError> {
            self.check(source)?;
            self.record(RecordedAction::AttachImage {
                source: source.to_string(),
            });
            Ok(())
        }

        async fn show_notice(&self, level: NoticeLevel, text: &str) {
            self.record(RecordedAction::Notice {
                level,
                text: text.to_string(),
            });
        }
    }
}
