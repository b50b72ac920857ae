use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use folio::cache::{CacheConfig, CacheLayer, CacheOptions, CacheTag, ContentChange, ManualClock};
use futures::FutureExt;
use futures::future::{BoxFuture, join, join_all};
use tokio::sync::Semaphore;

struct Harness {
    clock: Arc<ManualClock>,
    layer: CacheLayer,
    calls: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        let layer = CacheLayer::in_memory(CacheConfig::default(), clock.clone());
        Self {
            clock,
            layer,
            calls: Arc::new(AtomicUsize::new(0)),
            // Closed until a test adds permits.
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    fn open_gate(&self) {
        self.gate.add_permits(1024);
    }

    /// Producer returning its 1-based invocation number once the gate opens.
    fn producer(
        &self,
    ) -> impl Fn(()) -> BoxFuture<'static, Result<usize, String>> + Clone + use<> {
        let calls = Arc::clone(&self.calls);
        let gate = Arc::clone(&self.gate);
        move |_| {
            let calls = Arc::clone(&calls);
            let gate = Arc::clone(&gate);
            async move {
                let invocation = calls.fetch_add(1, Ordering::SeqCst) + 1;
                let _permit = gate.acquire().await.map_err(|err| err.to_string())?;
                Ok::<usize, String>(invocation)
            }
            .boxed()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Yield until spawned flight drivers have retired every flight.
async fn settle(layer: &CacheLayer) {
    for _ in 0..64 {
        if layer.in_flight() == 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
}

fn tagged(seconds: u64) -> CacheOptions {
    CacheOptions::revalidate(Duration::from_secs(seconds)).tags([CacheTag::Posts, CacheTag::Tags])
}

#[tokio::test]
async fn concurrent_misses_share_one_invocation() {
    let harness = Harness::new();
    let cached = harness.layer.cached(&["single-flight"], tagged(300), harness.producer());

    let waiters = join_all((0..8).map(|_| cached.call(())));
    tokio::pin!(waiters);
    assert!(futures::poll!(&mut waiters).is_pending());
    assert_eq!(harness.calls(), 1);

    harness.open_gate();
    let results = waiters.await;
    assert!(results.iter().all(|result| result == &Ok(1)));
    assert_eq!(harness.calls(), 1);

    assert_eq!(cached.call(()).await, Ok(1));
    assert_eq!(harness.calls(), 1);
}

#[tokio::test]
async fn entries_expire_exactly_at_revalidate() {
    let harness = Harness::new();
    harness.open_gate();
    let cached = harness.layer.cached(&["expiry"], tagged(60), harness.producer());

    assert_eq!(cached.call(()).await, Ok(1));

    harness.clock.advance(Duration::from_secs(59));
    assert_eq!(cached.call(()).await, Ok(1));
    assert_eq!(harness.calls(), 1);

    harness.clock.advance(Duration::from_secs(1));
    assert_eq!(cached.call(()).await, Ok(2));
    assert_eq!(harness.calls(), 2);
}

#[tokio::test]
async fn invalidation_recomputes_exactly_once() {
    let harness = Harness::new();
    harness.open_gate();
    let cached = harness.layer.cached(&["invalidate"], tagged(300), harness.producer());

    assert_eq!(cached.call(()).await, Ok(1));
    harness.layer.invalidate_by_tag(CacheTag::Tags);

    assert_eq!(cached.call(()).await, Ok(2));
    assert_eq!(cached.call(()).await, Ok(2));
    assert_eq!(harness.calls(), 2);
}

#[tokio::test]
async fn unrelated_tag_invalidation_keeps_entry() {
    let harness = Harness::new();
    harness.open_gate();
    let cached = harness.layer.cached(&["unrelated"], tagged(300), harness.producer());

    cached.call(()).await.expect("fill");
    harness.layer.invalidate_by_tag(CacheTag::Categories);
    cached.call(()).await.expect("hit");
    assert_eq!(harness.calls(), 1);
}

#[tokio::test]
async fn untagged_entries_ignore_content_changes() {
    let harness = Harness::new();
    harness.open_gate();
    let options = CacheOptions::revalidate(Duration::from_secs(300));
    let cached = harness.layer.cached(&["time-only"], options, harness.producer());

    cached.call(()).await.expect("fill");
    for tag in CacheTag::ALL {
        harness.layer.invalidate_by_tag(tag);
    }
    cached.call(()).await.expect("hit");
    assert_eq!(harness.calls(), 1);
}

#[tokio::test]
async fn invalidation_during_flight_starts_a_fresh_one() {
    let harness = Harness::new();
    let cached = harness.layer.cached(&["in-flight"], tagged(300), harness.producer());

    let before = cached.call(());
    tokio::pin!(before);
    assert!(futures::poll!(&mut before).is_pending());

    harness.layer.apply(ContentChange::PostUpdated);

    let after = cached.call(());
    tokio::pin!(after);
    assert!(futures::poll!(&mut after).is_pending());
    assert_eq!(harness.calls(), 2);

    harness.open_gate();
    assert_eq!(before.await, Ok(1));
    assert_eq!(after.await, Ok(2));

    // Only the value computed after the invalidation was stored.
    assert_eq!(cached.call(()).await, Ok(2));
    assert_eq!(harness.calls(), 2);
}

#[tokio::test]
async fn failures_are_shared_but_never_stored() {
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let layer = CacheLayer::in_memory(CacheConfig::default(), Arc::new(ManualClock::default()));

    let producer = {
        let calls = Arc::clone(&calls);
        let gate = Arc::clone(&gate);
        move |_: ()| {
            let calls = Arc::clone(&calls);
            let gate = Arc::clone(&gate);
            async move {
                let invocation = calls.fetch_add(1, Ordering::SeqCst) + 1;
                let _permit = gate.acquire().await.map_err(|err| err.to_string())?;
                if invocation == 1 {
                    Err("store unavailable".to_string())
                } else {
                    Ok::<usize, String>(invocation)
                }
            }
        }
    };
    let cached = layer.cached(&["failing"], tagged(300), producer);

    let waiters = join_all((0..4).map(|_| cached.call(())));
    tokio::pin!(waiters);
    assert!(futures::poll!(&mut waiters).is_pending());

    gate.add_permits(16);
    let results = waiters.await;
    assert!(
        results
            .iter()
            .all(|result| result == &Err("store unavailable".to_string()))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(layer.store().is_empty());

    assert_eq!(cached.call(()).await, Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn clear_forces_recomputation() {
    let harness = Harness::new();
    harness.open_gate();
    let cached = harness.layer.cached(&["clear"], tagged(300), harness.producer());

    cached.call(()).await.expect("fill");
    harness.layer.clear();
    assert_eq!(cached.call(()).await, Ok(2));
}

#[tokio::test]
async fn wrappers_with_distinct_key_parts_do_not_share_entries() {
    let harness = Harness::new();
    harness.open_gate();
    let first = harness.layer.cached(&["first"], tagged(300), harness.producer());
    let second = harness.layer.cached(&["second"], tagged(300), harness.producer());

    assert_eq!(first.call(()).await, Ok(1));
    assert_eq!(second.call(()).await, Ok(2));
    assert_eq!(first.call(()).await, Ok(1));
    assert_eq!(harness.layer.store().len(), 2);
}

#[tokio::test]
async fn wrappers_with_same_key_parts_share_one_invocation() {
    let harness = Harness::new();
    let first = harness.layer.cached(&["tags", "popular"], tagged(300), harness.producer());
    let second = harness.layer.cached(&["tags", "popular"], tagged(300), harness.producer());

    let both = join(first.call(()), second.call(()));
    tokio::pin!(both);
    assert!(futures::poll!(&mut both).is_pending());
    assert_eq!(harness.calls(), 1);
    assert_eq!(harness.layer.in_flight(), 1);

    harness.open_gate();
    assert_eq!(both.await, (Ok(1), Ok(1)));
    assert_eq!(harness.calls(), 1);
    assert_eq!(harness.layer.store().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_call_still_completes_and_stores() {
    let harness = Harness::new();
    let cached = harness.layer.cached(&["abandoned"], tagged(300), harness.producer());

    let attempt = tokio::time::timeout(Duration::from_millis(10), cached.call(())).await;
    assert!(attempt.is_err());
    assert_eq!(harness.calls(), 1);
    assert_eq!(harness.layer.in_flight(), 1);

    harness.open_gate();
    settle(&harness.layer).await;
    assert_eq!(harness.layer.in_flight(), 0);
    assert_eq!(harness.layer.store().len(), 1);

    assert_eq!(cached.call(()).await, Ok(1));
    assert_eq!(harness.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_calls_with_distinct_arguments_leave_no_flights() {
    let harness = Harness::new();
    let producer = harness.producer();
    let cached = harness
        .layer
        .cached(&["by-page"], tagged(300), move |_page: u32| producer(()));

    for page in 0..3 {
        let attempt = tokio::time::timeout(Duration::from_millis(10), cached.call(page)).await;
        assert!(attempt.is_err());
    }
    assert_eq!(harness.calls(), 3);
    assert_eq!(harness.layer.in_flight(), 3);

    harness.open_gate();
    settle(&harness.layer).await;
    assert_eq!(harness.layer.in_flight(), 0);
    assert_eq!(harness.layer.store().len(), 3);
}
