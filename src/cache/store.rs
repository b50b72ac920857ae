//! Cache storage.
//!
//! [`CacheStore`] is the contract the cache layer reads and writes through.
//! [`MemoryCacheStore`] is the process-wide in-memory implementation: one
//! map of entries plus a tag index so that invalidating a tag touches only
//! the entries registered under it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::entry::{CacheEntry, Epoch};
use super::keys::CacheKey;
use super::lock::{rw_read, rw_write};
use super::registry::CacheTag;

const SOURCE: &str = "cache::store";

const METRIC_CACHE_INVALIDATE_TOTAL: &str = "folio_cache_invalidate_total";
const METRIC_CACHE_PURGE_TOTAL: &str = "folio_cache_purge_total";

/// Keyed entry storage with tag-scoped invalidation.
///
/// Implementations must be safe to share across tasks; all mutation goes
/// through `&self`.
pub trait CacheStore: Send + Sync {
    /// Return the entry for `key` if it is fresh and none of its tags was
    /// invalidated after it was computed.
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Store an entry, replacing any previous entry for the same key.
    ///
    /// Returns `false` without storing when one of the entry's tags (or the
    /// whole store) was invalidated after `entry.epoch`.
    fn set(&self, entry: CacheEntry) -> bool;

    /// Drop every entry tagged with `tag` and reject in-flight values for it.
    /// Returns the number of entries removed.
    fn invalidate_by_tag(&self, tag: CacheTag) -> usize;

    /// Current epoch. Producers snapshot it before they start.
    fn epoch(&self) -> Epoch;

    /// True when a value computed at `epoch` for `tags` has not been
    /// superseded by an invalidation.
    fn is_current(&self, tags: &BTreeSet<CacheTag>, epoch: Epoch) -> bool;

    /// Drop every entry and reject every in-flight value.
    fn clear(&self);

    /// Remove entries whose revalidation window has passed.
    fn purge_expired(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<CacheKey, CacheEntry>,
    keys_by_tag: HashMap<CacheTag, HashSet<CacheKey>>,
    invalidated_at: HashMap<CacheTag, Epoch>,
    cleared_at: Epoch,
}

impl StoreState {
    fn is_current(&self, tags: &BTreeSet<CacheTag>, epoch: Epoch) -> bool {
        if self.cleared_at > epoch {
            return false;
        }
        tags.iter().all(|tag| {
            self.invalidated_at
                .get(tag)
                .is_none_or(|&invalidated| invalidated <= epoch)
        })
    }

    fn is_visible(&self, entry: &CacheEntry, now: OffsetDateTime) -> bool {
        entry.is_fresh(now) && self.is_current(&entry.tags, entry.epoch)
    }

    fn insert(&mut self, entry: CacheEntry) {
        let key = entry.key.clone();
        for tag in &entry.tags {
            self.keys_by_tag
                .entry(*tag)
                .or_default()
                .insert(key.clone());
        }
        if let Some(previous) = self.entries.insert(key.clone(), entry) {
            let current_tags = &self.entries[&key].tags;
            let stale_tags: Vec<CacheTag> = previous.tags.difference(current_tags).copied().collect();
            for tag in stale_tags {
                self.unregister(tag, &key);
            }
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        for tag in &entry.tags {
            self.unregister(*tag, key);
        }
        Some(entry)
    }

    fn unregister(&mut self, tag: CacheTag, key: &CacheKey) {
        if let Some(keys) = self.keys_by_tag.get_mut(&tag) {
            keys.remove(key);
            if keys.is_empty() {
                self.keys_by_tag.remove(&tag);
            }
        }
    }
}

/// In-memory [`CacheStore`].
///
/// Create one at process start and share it by `Arc`. Entries leave the
/// store only by expiry, invalidation or [`CacheStore::clear`]; there is no
/// capacity bound.
pub struct MemoryCacheStore {
    state: RwLock<StoreState>,
    epoch: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            epoch: AtomicU64::new(0),
            clock,
        }
    }

    /// Number of entries currently registered under `tag`.
    pub fn tagged_len(&self, tag: CacheTag) -> usize {
        rw_read(&self.state, SOURCE, "tagged_len")
            .keys_by_tag
            .get(&tag)
            .map_or(0, HashSet::len)
    }

    fn advance_epoch(&self) -> Epoch {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = self.clock.now();
        {
            let state = rw_read(&self.state, SOURCE, "get");
            let entry = state.entries.get(key)?;
            if state.is_visible(entry, now) {
                return Some(entry.clone());
            }
        }

        let mut state = rw_write(&self.state, SOURCE, "get.evict");
        let still_stale = state
            .entries
            .get(key)
            .is_some_and(|entry| !state.is_visible(entry, now));
        if still_stale {
            state.remove(key);
            debug!(key = %key, "Dropped stale cache entry on read");
        }
        None
    }

    fn set(&self, entry: CacheEntry) -> bool {
        let mut state = rw_write(&self.state, SOURCE, "set");
        if !state.is_current(&entry.tags, entry.epoch) {
            return false;
        }
        state.insert(entry);
        true
    }

    fn invalidate_by_tag(&self, tag: CacheTag) -> usize {
        let mut state = rw_write(&self.state, SOURCE, "invalidate_by_tag");
        let epoch = self.advance_epoch();
        state.invalidated_at.insert(tag, epoch);

        let keys = state.keys_by_tag.remove(&tag).unwrap_or_default();
        let removed = keys
            .iter()
            .filter(|key| state.remove(key).is_some())
            .count();
        drop(state);

        counter!(METRIC_CACHE_INVALIDATE_TOTAL, "tag" => tag.as_str()).increment(1);
        info!(
            cache_tag = %tag,
            epoch,
            removed,
            "Cache tag invalidated"
        );
        removed
    }

    fn epoch(&self) -> Epoch {
        self.epoch.load(Ordering::SeqCst)
    }

    fn is_current(&self, tags: &BTreeSet<CacheTag>, epoch: Epoch) -> bool {
        rw_read(&self.state, SOURCE, "is_current").is_current(tags, epoch)
    }

    fn clear(&self) {
        let mut state = rw_write(&self.state, SOURCE, "clear");
        let epoch = self.advance_epoch();
        let removed = state.entries.len();
        state.entries.clear();
        state.keys_by_tag.clear();
        state.cleared_at = epoch;
        drop(state);

        info!(epoch, removed, "Cache cleared");
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = rw_write(&self.state, SOURCE, "purge_expired");
        let expired: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        drop(state);

        if !expired.is_empty() {
            counter!(METRIC_CACHE_PURGE_TOTAL).increment(expired.len() as u64);
        }
        expired.len()
    }

    fn len(&self) -> usize {
        rw_read(&self.state, SOURCE, "len").entries.len()
    }
}
