//! Stored cache entries.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::keys::CacheKey;
use super::registry::CacheTag;

/// Monotonic store epoch.
///
/// The store advances it on every invalidation. An entry remembers the epoch
/// observed when its producer started, and is only current while none of
/// its tags was invalidated after that point.
pub type Epoch = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub tags: BTreeSet<CacheTag>,
    pub value: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub epoch: Epoch,
}

impl CacheEntry {
    pub fn new(
        key: CacheKey,
        tags: BTreeSet<CacheTag>,
        value: serde_json::Value,
        now: OffsetDateTime,
        revalidate: Duration,
        epoch: Epoch,
    ) -> Self {
        let ttl = time::Duration::try_from(revalidate).unwrap_or(time::Duration::MAX);
        Self {
            key,
            tags,
            value,
            created_at: now,
            expires_at: now.saturating_add(ttl),
            epoch,
        }
    }

    /// Entries are fresh strictly before `expires_at`.
    pub fn is_fresh(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }
}
