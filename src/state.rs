//! Durable run state surviving full page reloads.
//!
//! Everything the orchestrator must remember across navigations lives
//! here: phase, payload, attempt count, completion flags. The store is
//! readable by a freshly constructed orchestrator with no prior in-memory
//! context, which is what makes every handler safe to re-enter from a
//! cold start.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

use crate::workflow::phase::Phase;
use crate::workflow::run::{ListingPayload, MAX_ATTEMPTS};

/// The persisted record for one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRun {
    pub run_id: Uuid,
    pub workflow_phase: Phase,
    pub submission_payload: ListingPayload,
    pub attempt_count: u32,
    #[serde(default)]
    pub completion_flags: BTreeMap<String, bool>,
    /// Digest of the payload this record belongs to.
    pub payload_fingerprint: String,
    /// Host the workflow was running against when last persisted.
    #[serde(default)]
    pub posting_host: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PersistedRun {
    pub fn new(payload: &ListingPayload, host: Option<&str>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_phase: Phase::Idle,
            submission_payload: payload.clone(),
            attempt_count: 0,
            completion_flags: BTreeMap::new(),
            payload_fingerprint: payload.fingerprint(),
            posting_host: host.map(String::from),
            created_at: Utc::now(),
        }
    }

    /// Whether the attempt ceiling has been exceeded.
    pub fn attempts_exhausted(&self) -> bool {
        self.attempt_count > MAX_ATTEMPTS
    }

    /// A persisted record may only be reused for the same payload on the
    /// same posting host; anything else is stale and must not be replayed.
    pub fn matches(&self, payload: &ListingPayload, host: Option<&str>) -> bool {
        if self.payload_fingerprint != payload.fingerprint() {
            return false;
        }
        match (&self.posting_host, host) {
            (Some(stored), Some(current)) => stored == current,
            // Host unknown on either side: fingerprint match is the best
            // signal we have.
            _ => true,
        }
    }
}

/// Partial update merged into the persisted record read-modify-write.
#[derive(Debug, Clone, Default)]
pub struct RunStatePatch {
    pub workflow_phase: Option<Phase>,
    pub attempt_count: Option<u32>,
    pub completion_flags: Option<BTreeMap<String, bool>>,
    pub posting_host: Option<String>,
}

impl RunStatePatch {
    pub fn phase(phase: Phase) -> Self {
        Self {
            workflow_phase: Some(phase),
            ..Default::default()
        }
    }

    pub fn apply(self, record: &mut PersistedRun) {
        if let Some(phase) = self.workflow_phase {
            record.workflow_phase = phase;
        }
        if let Some(count) = self.attempt_count {
            record.attempt_count = count;
        }
        if let Some(flags) = self.completion_flags {
            record.completion_flags.extend(flags);
        }
        if let Some(host) = self.posting_host {
            record.posting_host = Some(host);
        }
    }
}

/// Durable key-value style store for the run record.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<Option<PersistedRun>>;
    fn save(&self, record: &PersistedRun) -> Result<()>;
    fn clear(&self) -> Result<()>;

    /// Read-modify-write merge of a partial update. A no-op when nothing
    /// is persisted yet.
    fn patch(&self, patch: RunStatePatch) -> Result<()> {
        if let Some(mut record) = self.load()? {
            patch.apply(&mut record);
            self.save(&record)?;
        }
        Ok(())
    }
}

/// JSON-file backed store under the configured state directory.
pub struct FileStateStore {
    state_file: PathBuf,
}

impl FileStateStore {
    pub fn new(state_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&state_dir).context("Failed to create state directory")?;
        Ok(Self {
            state_file: state_dir.join("run.json"),
        })
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<PersistedRun>> {
        if !self.state_file.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&self.state_file).context("Failed to read run state file")?;
        let record = serde_json::from_str(&contents).context("Failed to parse run state file")?;
        Ok(Some(record))
    }

    fn save(&self, record: &PersistedRun) -> Result<()> {
        let contents = serde_json::to_string_pretty(record)?;
        fs::write(&self.state_file, contents).context("Failed to write run state file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.state_file.exists() {
            fs::remove_file(&self.state_file).context("Failed to clear run state file")?;
        }
        Ok(())
    }
}

/// In-memory store for tests and one-shot invocations.
#[derive(Default)]
pub struct MemoryStateStore {
    record: Mutex<Option<PersistedRun>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<PersistedRun>> {
        Ok(self.record.lock().expect("state lock poisoned").clone())
    }

    fn save(&self, record: &PersistedRun) -> Result<()> {
        *self.record.lock().expect("state lock poisoned") = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.record.lock().expect("state lock poisoned") = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn payload() -> ListingPayload {
        ListingPayload {
            title: "Desk lamp".to_string(),
            price: "15".to_string(),
            description: "Barely used".to_string(),
            postal_code: "94118".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf()).unwrap();

        assert!(store.load().unwrap().is_none());

        let record = PersistedRun::new(&payload(), Some("post.example.org"));
        store.save(&record).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.workflow_phase, Phase::Idle);
        assert_eq!(loaded.payload_fingerprint, payload().fingerprint());

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_attempt_ceiling() {
        let mut record = PersistedRun::new(&payload(), None);
        assert!(!record.attempts_exhausted());
        record.attempt_count = 3;
        assert!(!record.attempts_exhausted());
        record.attempt_count = 4;
        assert!(record.attempts_exhausted());
    }

    #[test]
    fn test_patch_merges_flags() {
        let store = MemoryStateStore::new();
        store.save(&PersistedRun::new(&payload(), None)).unwrap();

        let mut flags = BTreeMap::new();
        flags.insert("title_filled".to_string(), true);
        store
            .patch(RunStatePatch {
                workflow_phase: Some(Phase::FormFill),
                completion_flags: Some(flags),
                ..Default::default()
            })
            .unwrap();

        let mut more = BTreeMap::new();
        more.insert("price_filled".to_string(), true);
        store
            .patch(RunStatePatch {
                completion_flags: Some(more),
                ..Default::default()
            })
            .unwrap();

        let record = store.load().unwrap().unwrap();
        assert_eq!(record.workflow_phase, Phase::FormFill);
        assert_eq!(record.completion_flags.get("title_filled"), Some(&true));
        assert_eq!(record.completion_flags.get("price_filled"), Some(&true));
    }

    #[test]
    fn test_patch_without_record_is_noop() {
        let store = MemoryStateStore::new();
        store.patch(RunStatePatch::phase(Phase::FormFill)).unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_stale_record_rejected() {
        let record = PersistedRun::new(&payload(), Some("post.example.org"));

        assert!(record.matches(&payload(), Some("post.example.org")));
        assert!(!record.matches(&payload(), Some("post.other.org")));

        let mut other = payload();
        other.title = "Different listing".to_string();
        assert!(!record.matches(&other, Some("post.example.org")));
    }
}
