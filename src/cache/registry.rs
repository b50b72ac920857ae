//! Cache-tag registry.
//!
//! [`CacheTag`] is the closed vocabulary of invalidation scopes. Every
//! cached producer declares the tags its value depends on, and every write
//! path invalidates the tags whose backing data it changed.
//! [`ContentChange`] holds that write-side mapping in one table so each
//! mutation site can be audited against it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Invalidation scope for cache entries.
///
/// Not to be confused with content tags, the topical labels on posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheTag {
    /// Post lists and anything derived from the set of posts: feeds,
    /// archives, popular-tag statistics.
    Posts,
    /// Category lists and per-category post counts.
    Categories,
    /// Content-tag lists and tag statistics.
    Tags,
    /// Single-post detail views, looked up by slug or id.
    PostDetail,
}

impl CacheTag {
    pub const ALL: [CacheTag; 4] = [
        CacheTag::Posts,
        CacheTag::Categories,
        CacheTag::Tags,
        CacheTag::PostDetail,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheTag::Posts => "posts",
            CacheTag::Categories => "categories",
            CacheTag::Tags => "tags",
            CacheTag::PostDetail => "post-detail",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == value)
    }
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content mutations and the cache tags they invalidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentChange {
    /// A post was created, in any status.
    PostCreated,
    /// A post's title, body, slug or tag array changed.
    PostUpdated,
    /// A post was removed.
    PostDeleted,
    /// A post moved into the published state.
    PostPublished,
    /// A post left the published state.
    PostUnpublished,
    /// A category was created, renamed or removed, or posts moved between
    /// categories.
    CategoryChanged,
    /// A content tag was renamed or removed across posts.
    TagChanged,
}

impl ContentChange {
    /// Every cache tag whose backing data this change can alter.
    pub fn affected_tags(self) -> &'static [CacheTag] {
        match self {
            ContentChange::PostCreated => &[CacheTag::Posts, CacheTag::Tags, CacheTag::Categories],
            ContentChange::PostUpdated
            | ContentChange::PostDeleted
            | ContentChange::PostPublished
            | ContentChange::PostUnpublished => &[
                CacheTag::Posts,
                CacheTag::Tags,
                CacheTag::Categories,
                CacheTag::PostDetail,
            ],
            ContentChange::CategoryChanged => &[
                CacheTag::Categories,
                CacheTag::Posts,
                CacheTag::PostDetail,
            ],
            ContentChange::TagChanged => &[CacheTag::Tags, CacheTag::Posts, CacheTag::PostDetail],
        }
    }
}
