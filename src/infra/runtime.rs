//! Service wiring for processes embedding the folio core.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::application::aggregate::TagAggregator;
use crate::application::repos::ContentStore;
use crate::application::tags::PopularTagsService;
use crate::cache::{CacheConfig, CacheLayer, MemoryCacheStore, spawn_sweeper};
use crate::config::Settings;

use super::db::PostgresRepositories;
use super::error::InfraError;

/// Process-wide services sharing one cache store.
pub struct FolioServices {
    pub cache: CacheLayer,
    pub popular_tags: Arc<PopularTagsService>,
    sweeper: Option<JoinHandle<()>>,
}

impl FolioServices {
    /// Wire the cache and tag services over `store`.
    ///
    /// Spawns the expired-entry sweeper when configured, so this must run
    /// inside a tokio runtime in that case.
    pub fn build(settings: &Settings, store: Arc<dyn ContentStore>) -> Self {
        let config = CacheConfig::from(&settings.cache);
        let cache_store = Arc::new(MemoryCacheStore::new());
        let cache = CacheLayer::new(config.clone(), cache_store.clone());

        let sweeper = if config.enabled {
            config
                .sweep_interval()
                .map(|every| spawn_sweeper(cache_store, every))
        } else {
            None
        };

        let popular_tags = Arc::new(PopularTagsService::new(
            &cache,
            TagAggregator::new(store),
            &settings.tags,
        ));

        Self {
            cache,
            popular_tags,
            sweeper,
        }
    }

    pub fn has_sweeper(&self) -> bool {
        self.sweeper.is_some()
    }

    /// Stop background tasks.
    pub async fn shutdown(self) {
        if let Some(handle) = self.sweeper {
            handle.abort();
            let _ = handle.await;
        }
    }
}

/// Connect to Postgres, apply migrations and wire services over it.
pub async fn start(settings: &Settings) -> Result<(FolioServices, PostgresRepositories), InfraError> {
    let url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database.url is not set"))?;

    let pool = PostgresRepositories::connect(url, settings.database.max_connections.get()).await?;
    PostgresRepositories::run_migrations(&pool).await?;

    let repositories = PostgresRepositories::new(pool);
    repositories.health_check().await?;
    info!(
        max_connections = settings.database.max_connections.get(),
        "Database ready"
    );

    let services = FolioServices::build(settings, Arc::new(repositories.clone()));
    Ok((services, repositories))
}
