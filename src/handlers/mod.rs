//! Phase-specific step handlers.
//!
//! One handler per wizard phase. Handlers act through the
//! [`ActionSink`](crate::sink::ActionSink), record per-sub-action
//! completion flags on the context, and return a
//! [`StepOutcome`](crate::workflow::outcome::StepOutcome). Every handler
//! assumes it may be running on a cold start after a full page reload.

pub mod matching;

mod category;
mod form;
mod images;
mod initial;
mod map;
mod preview;
mod publish;
mod region;

pub use category::{CategorySelectionHandler, TypeSelectionHandler};
pub use form::FormFillHandler;
pub use images::ImageUploadHandler;
pub use initial::InitialPageHandler;
pub use map::MapLocationHandler;
pub use preview::PreviewHandler;
pub use publish::{PublishingHandler, REQUIRES_CONFIRMATION_FLAG};
pub use region::{HoodSelectionHandler, SubareaSelectionHandler};

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::page::EnvSnapshot;
use crate::sink::ActionSink;
use crate::workflow::outcome::{StepError, StepOutcome};
use crate::workflow::phase::Phase;
use crate::workflow::retry::RetryPolicy;
use crate::workflow::run::ListingPayload;

/// Control and field identifiers the page-side agent resolves to real
/// elements.
pub mod targets {
    pub const CREATE_POSTING_LINK: &str = "create-posting-link";
    pub const FORM_CONTINUE: &str = "form-continue";
    pub const IMAGES_DONE: &str = "images-done";
    pub const MAP_CONTINUE: &str = "map-continue";
    pub const PREVIEW_PUBLISH: &str = "preview-publish";

    pub const TITLE_FIELD: &str = "posting-title";
    pub const PRICE_FIELD: &str = "price";
    pub const POSTAL_FIELD: &str = "postal-code";
    pub const DESCRIPTION_FIELD: &str = "posting-body";
    pub const CONDITION_FIELD: &str = "condition";
    pub const LANGUAGE_FIELD: &str = "language";

    pub const SUBAREA_GROUP: &str = "subarea";
    pub const HOOD_GROUP: &str = "hood";
    pub const TYPE_GROUP: &str = "posting-type";
    pub const CATEGORY_GROUP: &str = "category";
}

/// Polling bounds for marker waits.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub timeout: Duration,
    pub tick: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            tick: Duration::from_millis(250),
        }
    }
}

/// Everything a handler gets to work with for one invocation.
pub struct StepContext<'a> {
    pub payload: &'a ListingPayload,
    pub sink: &'a dyn ActionSink,
    pub poll: PollSettings,
    flags: Mutex<BTreeMap<String, bool>>,
}

impl<'a> StepContext<'a> {
    pub fn new(payload: &'a ListingPayload, sink: &'a dyn ActionSink, poll: PollSettings) -> Self {
        Self {
            payload,
            sink,
            poll,
            flags: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record a named completion flag for diagnostics.
    pub fn set_flag(&self, name: &str, value: bool) {
        self.flags
            .lock()
            .expect("flag lock poisoned")
            .insert(name.to_string(), value);
    }

    /// Drain the flags recorded so far.
    pub fn take_flags(&self) -> BTreeMap<String, bool> {
        std::mem::take(&mut *self.flags.lock().expect("flag lock poisoned"))
    }

    /// Wait (bounded) for a structural marker to appear.
    ///
    /// The location at the start of the wait is the origin identity; if
    /// the page navigates away mid-wait the loop aborts immediately
    /// instead of acting on a page we no longer recognize.
    pub async fn wait_for_marker(&self, marker: &str) -> Result<EnvSnapshot, StepError> {
        self.wait_until(marker, |snap| snap.has_marker(marker)).await
    }

    /// Wait (bounded) until `ready` holds on a fresh snapshot.
    pub async fn wait_until<F>(&self, target: &str, ready: F) -> Result<EnvSnapshot, StepError>
    where
        F: Fn(&EnvSnapshot) -> bool,
    {
        let started = Instant::now();
        let first = self.sink.snapshot().await?;
        let origin = first.location.clone();
        let mut snapshot = first;

        loop {
            if ready(&snapshot) {
                return Ok(snapshot);
            }
            if snapshot.location != origin {
                return Err(StepError::Cancelled {
                    origin,
                    current: snapshot.location,
                });
            }
            if started.elapsed() >= self.poll.timeout {
                return Err(StepError::PhaseTimeout {
                    target: target.to_string(),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.poll.tick).await;
            snapshot = self.sink.snapshot().await?;
        }
    }
}

/// A phase-specific step procedure.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, StepError>;
}

/// Phase to handler-and-policy registry.
///
/// Policy assignment follows the required/optional split: phases the
/// workflow cannot proceed without are hard, bypassable phases are soft,
/// and form fill is hard but single-shot because it performs many
/// independent sub-fills.
pub struct HandlerRegistry {
    entries: HashMap<Phase, (Arc<dyn StepHandler>, RetryPolicy)>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl HandlerRegistry {
    pub fn standard() -> Self {
        Self::tuned(RetryPolicy::hard(), RetryPolicy::soft())
    }

    /// Standard handler set with caller-tuned retry policies. The form
    /// fill policy derives from `hard` but stays single-shot.
    pub fn tuned(hard: RetryPolicy, soft: RetryPolicy) -> Self {
        let single = hard.clone().with_max_attempts(1);
        let mut entries: HashMap<Phase, (Arc<dyn StepHandler>, RetryPolicy)> = HashMap::new();
        entries.insert(
            Phase::InitialPage,
            (Arc::new(InitialPageHandler), hard.clone()),
        );
        entries.insert(
            Phase::SubareaSelection,
            (Arc::new(SubareaSelectionHandler), hard.clone()),
        );
        entries.insert(
            Phase::HoodSelection,
            (Arc::new(HoodSelectionHandler), soft.clone()),
        );
        entries.insert(
            Phase::TypeSelection,
            (Arc::new(TypeSelectionHandler), hard.clone()),
        );
        entries.insert(
            Phase::CategorySelection,
            (Arc::new(CategorySelectionHandler), hard.clone()),
        );
        entries.insert(Phase::FormFill, (Arc::new(FormFillHandler), single));
        entries.insert(
            Phase::ImageUpload,
            (Arc::new(ImageUploadHandler), soft.clone()),
        );
        entries.insert(
            Phase::MapLocation,
            (Arc::new(MapLocationHandler), soft.clone()),
        );
        entries.insert(Phase::Preview, (Arc::new(PreviewHandler), soft));
        entries.insert(Phase::Publishing, (Arc::new(PublishingHandler), hard));
        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        phase: Phase,
        handler: Arc<dyn StepHandler>,
        policy: RetryPolicy,
    ) {
        self.entries.insert(phase, (handler, policy));
    }

    pub fn get(&self, phase: Phase) -> Option<(&Arc<dyn StepHandler>, &RetryPolicy)> {
        self.entries
            .get(&phase)
            .map(|(handler, policy)| (handler, policy))
    }
}
