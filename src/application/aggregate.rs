//! Popular-tag aggregation with a grouped-query primary path and an
//! in-memory fallback.
//!
//! The primary strategy asks the store to explode, group and count tag
//! arrays in one query. Stores that cannot do that (or fail for any other
//! reason) are answered by the fallback strategy, which fetches every
//! published post's tag array and tallies them in process. Both strategies
//! count raw occurrences over the same published posts, so they agree on the
//! multiset of `(name, count)` pairs. Tie order between them is not
//! guaranteed to match.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::application::repos::{ContentStore, RawTagCount, RepoError};
use crate::domain::tags::{TagCount, TagTally, rank};
use crate::domain::types::PostStatus;

const METRIC_TAGS_FALLBACK_TOTAL: &str = "folio_tags_fallback_total";
const METRIC_TAGS_AGGREGATE_MS: &str = "folio_tags_aggregate_ms";

/// Only published posts are eligible for tag statistics.
const ELIGIBLE_STATUS: PostStatus = PostStatus::Published;

/// Way of computing tag counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationStrategy {
    /// Grouped-count query executed by the store.
    Primary,
    /// Full tag-array fetch tallied in memory.
    Fallback,
}

impl AggregationStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationStrategy::Primary => "primary",
            AggregationStrategy::Fallback => "fallback",
        }
    }
}

impl fmt::Display for AggregationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("tag aggregation failed (primary: {primary}; fallback: {fallback})")]
    Failed {
        primary: RepoError,
        fallback: RepoError,
    },
}

#[derive(Clone)]
pub struct TagAggregator {
    store: Arc<dyn ContentStore>,
}

impl TagAggregator {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// The `limit` most used tags across published posts, highest count first.
    ///
    /// Primary-path failures are logged and recovered through the fallback;
    /// only a failure of both paths reaches the caller.
    #[instrument(skip(self))]
    pub async fn popular_tags(&self, limit: usize) -> Result<Vec<TagCount>, AggregationError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let started_at = Instant::now();
        let primary = match self.run(AggregationStrategy::Primary, limit).await {
            Ok(tags) => {
                record_latency(AggregationStrategy::Primary, started_at);
                return Ok(tags);
            }
            Err(error) => error,
        };

        warn!(
            strategy = %AggregationStrategy::Primary,
            error = %primary,
            "Primary tag aggregation failed; falling back to in-memory tally"
        );
        counter!(METRIC_TAGS_FALLBACK_TOTAL).increment(1);

        match self.run(AggregationStrategy::Fallback, limit).await {
            Ok(tags) => {
                record_latency(AggregationStrategy::Fallback, started_at);
                Ok(tags)
            }
            Err(fallback) => {
                warn!(
                    primary_error = %primary,
                    fallback_error = %fallback,
                    "Tag aggregation failed on both strategies"
                );
                Err(AggregationError::Failed { primary, fallback })
            }
        }
    }

    /// Execute exactly one strategy without any recovery.
    pub async fn run(
        &self,
        strategy: AggregationStrategy,
        limit: usize,
    ) -> Result<Vec<TagCount>, RepoError> {
        let tags = match strategy {
            AggregationStrategy::Primary => {
                let rows = self
                    .store
                    .aggregate_tag_counts(ELIGIBLE_STATUS, limit)
                    .await?;
                rank(convert_rows(rows)?, limit)
            }
            AggregationStrategy::Fallback => {
                let arrays = self.store.list_content_tag_arrays(ELIGIBLE_STATUS).await?;
                let mut tally = TagTally::new();
                for tags in arrays.iter().filter(|tags| !tags.is_empty()) {
                    tally.record(tags);
                }
                tally.into_ranked(limit)
            }
        };

        debug!(
            strategy = %strategy,
            limit,
            returned = tags.len(),
            "Tag aggregation completed"
        );
        Ok(tags)
    }
}

fn convert_rows(rows: Vec<RawTagCount>) -> Result<Vec<TagCount>, RepoError> {
    rows.into_iter()
        .map(|(name, count)| {
            let count = u64::try_from(count).map_err(|_| RepoError::InvalidData {
                message: format!("negative count {count} for tag `{name}`"),
            })?;
            Ok(TagCount { name, count })
        })
        .collect()
}

fn record_latency(strategy: AggregationStrategy, started_at: Instant) {
    histogram!(METRIC_TAGS_AGGREGATE_MS, "strategy" => strategy.as_str())
        .record(started_at.elapsed().as_secs_f64() * 1000.0);
}
