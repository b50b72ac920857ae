use async_trait::async_trait;

use crate::{
    application::repos::{ContentStore, RawTagCount, RepoError},
    domain::types::PostStatus,
};

use super::{PUBLISHED_PREDICATE, PostgresRepositories, map_sqlx_error};

#[async_trait]
impl ContentStore for PostgresRepositories {
    async fn aggregate_tag_counts(
        &self,
        status: PostStatus,
        limit: usize,
    ) -> Result<Vec<RawTagCount>, RepoError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        // Ties rank by the earliest publication carrying the tag.
        let sql = format!(
            r#"
            SELECT tag, COUNT(*)::BIGINT AS usage_count
            FROM posts p
            CROSS JOIN LATERAL unnest(p.tags) AS tag
            WHERE {PUBLISHED_PREDICATE} AND tag IS NOT NULL
            GROUP BY tag
            ORDER BY usage_count DESC, MIN(p.published_at) ASC, tag ASC
            LIMIT $2
            "#
        );

        sqlx::query_as::<_, RawTagCount>(&sql)
            .bind(status)
            .bind(limit)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn list_content_tag_arrays(
        &self,
        status: PostStatus,
    ) -> Result<Vec<Vec<String>>, RepoError> {
        let sql = format!(
            r#"
            SELECT p.tags
            FROM posts p
            WHERE {PUBLISHED_PREDICATE}
            ORDER BY p.published_at ASC, p.id ASC
            "#
        );

        // Both the array and its elements may be NULL.
        let rows = sqlx::query_scalar::<_, Option<Vec<Option<String>>>>(&sql)
            .bind(status)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|tags| tags.into_iter().flatten().flatten().collect())
            .collect())
    }
}
