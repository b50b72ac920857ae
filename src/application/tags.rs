//! Popular-tag lookups served through the content cache.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::application::aggregate::{AggregationError, TagAggregator};
use crate::cache::{CacheLayer, CacheOptions, CacheTag, Cached};
use crate::config::TagsSettings;
use crate::domain::tags::TagCount;

/// Cache key parts identifying the popular-tags producer.
pub const POPULAR_TAGS_KEY: [&str; 2] = ["tags", "popular"];

/// Invalidation scope of popular-tag statistics: any post mutation can
/// change which tags are counted, and tag renames change the labels.
pub const POPULAR_TAGS_SCOPE: [CacheTag; 2] = [CacheTag::Posts, CacheTag::Tags];

type PopularTagsProducer =
    Box<dyn Fn(usize) -> BoxFuture<'static, Result<Vec<TagCount>, AggregationError>> + Send + Sync>;

/// Popular-tag statistics served through the content cache.
pub struct PopularTagsService {
    popular: Cached<usize, Vec<TagCount>, AggregationError, PopularTagsProducer>,
    default_limit: usize,
}

impl PopularTagsService {
    pub fn new(cache: &CacheLayer, aggregator: TagAggregator, settings: &TagsSettings) -> Self {
        let aggregator = Arc::new(aggregator);
        let producer: PopularTagsProducer = Box::new(move |limit| {
            let aggregator = Arc::clone(&aggregator);
            async move { aggregator.popular_tags(limit).await }.boxed()
        });
        let options = CacheOptions::revalidate(settings.revalidate).tags(POPULAR_TAGS_SCOPE);

        Self {
            popular: cache.cached(&POPULAR_TAGS_KEY, options, producer),
            default_limit: settings.popular_limit.get(),
        }
    }

    /// Popular tags using the configured limit.
    pub async fn popular_tags(&self) -> Result<Vec<TagCount>, AggregationError> {
        self.popular.call(self.default_limit).await
    }

    /// Popular tags for an explicit limit; each limit is its own cache slot.
    pub async fn popular_tags_with_limit(
        &self,
        limit: usize,
    ) -> Result<Vec<TagCount>, AggregationError> {
        self.popular.call(limit).await
    }
}
