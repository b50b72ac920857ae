//! Content tag statistics.
//!
//! A content tag is the topical label an author attaches to a post. It is
//! unrelated to the cache invalidation tags in [`crate::cache::CacheTag`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Number of tags returned by popular-tag queries when the caller does not
/// ask for a specific limit.
pub const DEFAULT_POPULAR_TAG_LIMIT: usize = 10;

/// Occurrence count for a single content tag across published posts.
///
/// Counts are per raw occurrence: a post whose tag array is
/// `["film", "film"]` contributes two to `film`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagCount {
    pub name: String,
    pub count: u64,
}

impl TagCount {
    pub fn new(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

/// Frequency table that remembers the order in which tags were first seen.
#[derive(Debug, Default)]
pub struct TagTally {
    counts: Vec<TagCount>,
    index: HashMap<String, usize>,
}

impl TagTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every occurrence in one post's tag array.
    pub fn record<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            let tag = tag.as_ref();
            match self.index.get(tag) {
                Some(&position) => self.counts[position].count += 1,
                None => {
                    self.index.insert(tag.to_string(), self.counts.len());
                    self.counts.push(TagCount::new(tag, 1));
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Rank the tally and keep the first `limit` tags.
    pub fn into_ranked(self, limit: usize) -> Vec<TagCount> {
        rank(self.counts, limit)
    }
}

/// Sort by count descending and truncate to `limit`.
///
/// The sort is stable, so tags with equal counts keep the order they had in
/// `counts`.
pub fn rank(mut counts: Vec<TagCount>, limit: usize) -> Vec<TagCount> {
    counts.sort_by(|left, right| right.count.cmp(&left.count));
    counts.truncate(limit);
    counts
}
