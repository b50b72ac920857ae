//! Periodic removal of expired entries.
//!
//! Reads already drop expired entries lazily; the sweeper only bounds the
//! memory held by slots nobody reads again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::store::CacheStore;

/// Spawn a task purging expired entries every `every`.
///
/// The first purge happens one full interval after spawning. Abort the
/// returned handle to stop the task.
pub fn spawn_sweeper(store: Arc<dyn CacheStore>, every: Duration) -> JoinHandle<()> {
    info!(interval_secs = every.as_secs(), "Starting cache sweeper");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            let removed = store.purge_expired();
            if removed > 0 {
                debug!(removed, remaining = store.len(), "Cache sweep removed expired entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::super::clock::{Clock, ManualClock};
    use super::super::entry::CacheEntry;
    use super::super::keys::CacheKey;
    use super::super::store::MemoryCacheStore;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_after_interval() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryCacheStore::with_clock(clock.clone()));
        store.set(CacheEntry::new(
            CacheKey::new(["short"]),
            BTreeSet::new(),
            serde_json::json!(1),
            clock.now(),
            Duration::from_secs(5),
            store.epoch(),
        ));
        store.set(CacheEntry::new(
            CacheKey::new(["long"]),
            BTreeSet::new(),
            serde_json::json!(2),
            clock.now(),
            Duration::from_secs(600),
            store.epoch(),
        ));

        let handle = spawn_sweeper(store.clone(), Duration::from_secs(60));
        clock.advance(Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.len(), 2);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(store.len(), 1);

        handle.abort();
    }
}
