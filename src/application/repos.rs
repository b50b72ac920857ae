//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::types::PostStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store does not support this query: {0}")]
    Unsupported(String),
    #[error("database timeout")]
    Timeout,
    #[error("invalid data: {message}")]
    InvalidData { message: String },
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn unsupported(err: impl std::fmt::Display) -> Self {
        Self::Unsupported(err.to_string())
    }
}

/// Raw `(tag, count)` row as reported by a grouped aggregate query.
pub type RawTagCount = (String, i64);

/// Read-only access to post tag data.
///
/// Implementations must apply the same status predicate in both methods so
/// that the two aggregation strategies see the same set of posts.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Explode every matching post's tag array, group by label and return the
    /// `limit` most frequent labels, highest count first.
    ///
    /// Backends without array/aggregate support return
    /// [`RepoError::Unsupported`].
    async fn aggregate_tag_counts(
        &self,
        status: PostStatus,
        limit: usize,
    ) -> Result<Vec<RawTagCount>, RepoError>;

    /// Return the tag array of every matching post, in store order.
    async fn list_content_tag_arrays(
        &self,
        status: PostStatus,
    ) -> Result<Vec<Vec<String>>, RepoError>;
}
