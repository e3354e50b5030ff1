//! The unit of work: one listing submission driven across page loads.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Hard ceiling on full workflow restarts for one submission.
pub const MAX_ATTEMPTS: u32 = 3;

/// The listing data supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingPayload {
    pub title: String,
    pub price: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    pub description: String,
    pub postal_code: String,
    #[serde(default)]
    pub images: Vec<String>,
    /// Optional extra attributes (make, model, size, ...), keyed by the
    /// form field they fill. BTreeMap keeps the fingerprint stable.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ListingPayload {
    /// Stable digest of the payload, used to detect stale persisted state
    /// from a different submission.
    pub fn fingerprint(&self) -> String {
        // serde_json on a struct with BTreeMap fields serializes in a
        // stable field order.
        let serialized = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&serialized);
        format!("{:x}", digest)
    }
}
