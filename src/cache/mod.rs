//! Folio content cache
//!
//! A read-through cache for data-fetch functions, scoped by semantic
//! invalidation tags:
//!
//! - [`CacheLayer::cached`] wraps an async producer; calls are memoized per
//!   key parts and arguments, with single-flight on concurrent misses.
//! - Entries expire after their revalidation window, or earlier when one of
//!   their [`CacheTag`]s is invalidated.
//! - [`ContentChange`] maps every content mutation to the tags it must
//!   invalidate.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! default_revalidate_seconds = 300
//! sweep_interval_seconds = 60
//! ```

mod clock;
mod config;
mod entry;
mod keys;
mod layer;
mod lock;
mod registry;
mod store;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub(crate) use config::{DEFAULT_REVALIDATE_SECS, DEFAULT_SWEEP_INTERVAL_SECS, MAX_REVALIDATE_SECS};
pub use entry::{CacheEntry, Epoch};
pub use keys::{CacheKey, canonical_json};
pub use layer::{CacheLayer, CacheOptions, Cached};
pub use registry::{CacheTag, ContentChange};
pub use store::{CacheStore, MemoryCacheStore};
pub use sweeper::spawn_sweeper;
