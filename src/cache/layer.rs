//! Read-through cache layer.
//!
//! [`CacheLayer::cached`] wraps an async producer into a [`Cached`] value
//! whose [`Cached::call`] has the producer's signature. Calls are memoized
//! per `(key parts, arguments)` slot:
//!
//! - a fresh, current entry is returned without calling the producer;
//! - concurrent misses on one slot share a single producer invocation and
//!   all receive its result;
//! - producer errors reach every waiter unchanged and are never stored.
//!
//! Flights live in a table owned by the layer, so every wrapper built with
//! the same key parts coalesces onto one producer invocation.
//!
//! ```ignore
//! let popular = cache.cached(
//!     &["tags", "popular"],
//!     cache.options().tags([CacheTag::Posts, CacheTag::Tags]),
//!     move |limit: usize| {
//!         let aggregator = aggregator.clone();
//!         async move { aggregator.popular_tags(limit).await }
//!     },
//! );
//! let tags = popular.call(10).await?;
//! ```

use std::any::Any;
use std::collections::BTreeSet;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::config::{CacheConfig, MAX_REVALIDATE_SECS};
use super::entry::{CacheEntry, Epoch};
use super::keys::CacheKey;
use super::registry::{CacheTag, ContentChange};
use super::store::{CacheStore, MemoryCacheStore};

const METRIC_CACHE_HIT_TOTAL: &str = "folio_cache_hit_total";
const METRIC_CACHE_MISS_TOTAL: &str = "folio_cache_miss_total";
const METRIC_CACHE_STORE_TOTAL: &str = "folio_cache_store_total";
const METRIC_CACHE_PRODUCER_ERROR_TOTAL: &str = "folio_cache_producer_error_total";

/// Per-producer caching options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    revalidate: Duration,
    tags: BTreeSet<CacheTag>,
}

impl CacheOptions {
    /// Cache for `revalidate`, capped at one year. Zero disables caching.
    pub fn revalidate(revalidate: Duration) -> Self {
        Self {
            revalidate: revalidate.min(Duration::from_secs(MAX_REVALIDATE_SECS)),
            tags: BTreeSet::new(),
        }
    }

    /// Call the producer on every invocation.
    pub fn no_cache() -> Self {
        Self::revalidate(Duration::ZERO)
    }

    /// Add invalidation tags.
    pub fn tags(mut self, tags: impl IntoIterator<Item = CacheTag>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn revalidate_after(&self) -> Duration {
        self.revalidate
    }

    pub fn tag_set(&self) -> &BTreeSet<CacheTag> {
        &self.tags
    }

    pub fn is_caching(&self) -> bool {
        !self.revalidate.is_zero()
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::revalidate(CacheConfig::default().default_revalidate())
    }
}

type SharedResult<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// In-flight computations of every wrapper built from one layer.
///
/// Slots hold a type-erased [`SharedResult`]; wrappers sharing key parts
/// with a different value type never join each other's flights.
#[derive(Default)]
struct FlightTable {
    slots: DashMap<CacheKey, FlightSlot>,
    next_id: AtomicU64,
}

struct FlightSlot {
    id: u64,
    epoch: Epoch,
    future: Box<dyn Any + Send + Sync>,
}

/// Shared handle to the process-wide cache.
#[derive(Clone)]
pub struct CacheLayer {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    flights: Arc<FlightTable>,
}

impl CacheLayer {
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// `clock` must be the clock `store` checks freshness against.
    pub fn with_clock(config: CacheConfig, store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            store,
            clock,
            flights: Arc::new(FlightTable::default()),
        }
    }

    /// Layer over a fresh [`MemoryCacheStore`] sharing `clock`.
    pub fn in_memory(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(MemoryCacheStore::with_clock(Arc::clone(&clock)));
        Self::with_clock(config, store, clock)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Options using the configured default revalidation window.
    pub fn options(&self) -> CacheOptions {
        CacheOptions::revalidate(self.config.default_revalidate())
    }

    /// Number of producer invocations currently running.
    pub fn in_flight(&self) -> usize {
        self.flights.slots.len()
    }

    /// Wrap `producer` so calls are memoized under `key_parts` plus the
    /// call arguments.
    ///
    /// `key_parts` must name the producer uniquely: two wrappers built with
    /// the same parts share stored entries and in-flight computations.
    pub fn cached<A, T, E, F, Fut>(
        &self,
        key_parts: &[&str],
        options: CacheOptions,
        producer: F,
    ) -> Cached<A, T, E, F>
    where
        A: Serialize,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        Cached {
            key_parts: key_parts.iter().map(|part| part.to_string()).collect(),
            options,
            enabled: self.config.enabled,
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            producer,
            flights: Arc::clone(&self.flights),
            _result: PhantomData,
        }
    }

    /// Treat every entry tagged with `tag` as expired from now on.
    pub fn invalidate_by_tag(&self, tag: CacheTag) -> usize {
        self.store.invalidate_by_tag(tag)
    }

    /// Invalidate every tag a content mutation affects.
    pub fn apply(&self, change: ContentChange) -> usize {
        let removed = change
            .affected_tags()
            .iter()
            .map(|tag| self.store.invalidate_by_tag(*tag))
            .sum();
        debug!(change = ?change, removed, "Applied content change to cache");
        removed
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}

enum Joined<T, E> {
    Ready(T),
    Flight { id: u64, future: SharedResult<T, E> },
}

/// Memoized producer returned by [`CacheLayer::cached`].
pub struct Cached<A, T, E, F> {
    key_parts: Vec<String>,
    options: CacheOptions,
    enabled: bool,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    producer: F,
    flights: Arc<FlightTable>,
    _result: PhantomData<fn(A) -> Result<T, E>>,
}

impl<A, T, E, F: Clone> Clone for Cached<A, T, E, F> {
    fn clone(&self) -> Self {
        Self {
            key_parts: self.key_parts.clone(),
            options: self.options.clone(),
            enabled: self.enabled,
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            producer: self.producer.clone(),
            flights: Arc::clone(&self.flights),
            _result: PhantomData,
        }
    }
}

impl<A, T, E, F, Fut> Cached<A, T, E, F>
where
    A: Serialize,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Call through the cache.
    ///
    /// Dropping the returned future does not cancel a producer invocation
    /// other callers may share; it runs to completion and stores its value.
    pub async fn call(&self, args: A) -> Result<T, E> {
        if !self.enabled || !self.options.is_caching() {
            return (self.producer)(args).await;
        }

        let key = match CacheKey::with_args(&self.key_parts, &args) {
            Ok(key) => key,
            Err(error) => {
                warn!(
                    key_parts = ?self.key_parts,
                    error = %error,
                    "Failed to encode cache key arguments; calling producer uncached"
                );
                return (self.producer)(args).await;
            }
        };

        if let Some(value) = self.lookup(&key) {
            counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
            return Ok(value);
        }

        let (id, future) = match self.join_or_start(&key, args) {
            Joined::Ready(value) => {
                counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
                return Ok(value);
            }
            Joined::Flight { id, future } => (id, future),
        };
        counter!(METRIC_CACHE_MISS_TOTAL).increment(1);

        let result = future.await;
        // Without a runtime to drive it, the flight is retired by its waiters.
        self.flights.slots.remove_if(&key, |_, slot| slot.id == id);
        result
    }

    fn lookup(&self, key: &CacheKey) -> Option<T> {
        let entry = self.store.get(key)?;
        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(
                    key = %key,
                    error = %error,
                    "Cached value no longer matches producer type; recomputing"
                );
                None
            }
        }
    }

    fn join_or_start(&self, key: &CacheKey, args: A) -> Joined<T, E> {
        match self.flights.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if let Some(joined) = self.joinable(key, occupied.get()) {
                    return joined;
                }
                let (slot, joined) = self.start(key.clone(), args);
                occupied.insert(slot);
                joined
            }
            Entry::Vacant(vacant) => {
                if let Some(value) = self.lookup(key) {
                    return Joined::Ready(value);
                }
                let (slot, joined) = self.start(key.clone(), args);
                vacant.insert(slot);
                joined
            }
        }
    }

    fn joinable(&self, key: &CacheKey, slot: &FlightSlot) -> Option<Joined<T, E>> {
        if !self.store.is_current(&self.options.tags, slot.epoch) {
            debug!(key = %key, "In-flight computation predates an invalidation; starting another");
            return None;
        }
        let Some(future) = slot.future.downcast_ref::<SharedResult<T, E>>() else {
            warn!(
                key = %key,
                "In-flight computation produces a different value type; recomputing"
            );
            return None;
        };
        // Finished flights are only waiting for their driver to retire them.
        if future.peek().is_some() {
            return None;
        }
        debug!(key = %key, "Joining in-flight cache computation");
        Some(Joined::Flight {
            id: slot.id,
            future: future.clone(),
        })
    }

    /// Begin a producer invocation. Runs while the slot's entry lock is
    /// held, so the driver's removal always follows the insert.
    fn start(&self, key: CacheKey, args: A) -> (FlightSlot, Joined<T, E>) {
        let id = self.flights.next_id.fetch_add(1, Ordering::Relaxed);
        let epoch = self.store.epoch();
        let pending = (self.producer)(args);
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let tags = self.options.tags.clone();
        let revalidate = self.options.revalidate;
        let flight_key = key.clone();

        let future: SharedResult<T, E> = async move {
            let result = pending.await;
            match &result {
                Ok(value) => persist(
                    store.as_ref(),
                    clock.as_ref(),
                    flight_key,
                    tags,
                    revalidate,
                    epoch,
                    value,
                ),
                Err(_) => {
                    counter!(METRIC_CACHE_PRODUCER_ERROR_TOTAL).increment(1);
                    debug!(key = %flight_key, "Cache producer failed; nothing stored");
                }
            }
            result
        }
        .boxed()
        .shared();

        self.drive(key, id, future.clone());

        let slot = FlightSlot {
            id,
            epoch,
            future: Box::new(future.clone()),
        };
        (slot, Joined::Flight { id, future })
    }

    /// Poll the flight to completion on the runtime so it stores its value
    /// and leaves the table even when every caller has gone away.
    fn drive(&self, key: CacheKey, id: u64, future: SharedResult<T, E>) {
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        let flights = Arc::clone(&self.flights);
        runtime.spawn(async move {
            let _ = future.await;
            flights.slots.remove_if(&key, |_, slot| slot.id == id);
        });
    }
}

fn persist<T: Serialize>(
    store: &dyn CacheStore,
    clock: &dyn Clock,
    key: CacheKey,
    tags: BTreeSet<CacheTag>,
    revalidate: Duration,
    epoch: Epoch,
    value: &T,
) {
    let encoded = match serde_json::to_value(value) {
        Ok(encoded) => encoded,
        Err(error) => {
            warn!(
                key = %key,
                error = %error,
                "Failed to serialize producer result; returning it uncached"
            );
            return;
        }
    };

    let entry = CacheEntry::new(key, tags, encoded, clock.now(), revalidate, epoch);
    let key = entry.key.clone();
    if store.set(entry) {
        counter!(METRIC_CACHE_STORE_TOTAL).increment(1);
        debug!(key = %key, epoch, "Cache entry stored");
    } else {
        debug!(
            key = %key,
            epoch,
            "Discarded result computed before an invalidation of its tags"
        );
    }
}
