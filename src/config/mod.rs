//! Configuration layer: typed settings with layered precedence (file → environment).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::Path,
    str::FromStr,
    time::Duration,
};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{DEFAULT_REVALIDATE_SECS, DEFAULT_SWEEP_INTERVAL_SECS, MAX_REVALIDATE_SECS};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const ENV_PREFIX: &str = "FOLIO";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_TAGS_REVALIDATE_SECS: u64 = DEFAULT_REVALIDATE_SECS;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub tags: TagsSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub default_revalidate: Duration,
    /// `None` disables the expired-entry sweeper.
    pub sweep_interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct TagsSettings {
    pub popular_limit: NonZeroUsize,
    pub revalidate: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence
/// (`config/default` → `folio` → `config_file` → `FOLIO__*` environment).
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    Settings::from_config(builder.build()?)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    tags: RawTagsSettings,
}

impl Settings {
    fn from_config(config: Config) -> Result<Self, LoadError> {
        let raw: RawSettings = config.try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            tags,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            tags: build_tags_settings(tags)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS.into()),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let revalidate_secs = revalidate_seconds(
        cache
            .default_revalidate_seconds
            .unwrap_or(DEFAULT_REVALIDATE_SECS),
        "cache.default_revalidate_seconds",
    )?;

    let sweep_secs = cache
        .sweep_interval_seconds
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        default_revalidate: Duration::from_secs(revalidate_secs),
        sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
    })
}

fn build_tags_settings(tags: RawTagsSettings) -> Result<TagsSettings, LoadError> {
    let limit = tags
        .popular_limit
        .unwrap_or(crate::domain::tags::DEFAULT_POPULAR_TAG_LIMIT as u64);
    let limit: usize = limit
        .try_into()
        .map_err(|_| LoadError::invalid("tags.popular_limit", "value exceeds supported range"))?;
    let popular_limit = NonZeroUsize::new(limit)
        .ok_or_else(|| LoadError::invalid("tags.popular_limit", "must be greater than zero"))?;

    let revalidate_secs = revalidate_seconds(
        tags.revalidate_seconds
            .unwrap_or(DEFAULT_TAGS_REVALIDATE_SECS),
        "tags.revalidate_seconds",
    )?;

    Ok(TagsSettings {
        popular_limit,
        revalidate: Duration::from_secs(revalidate_secs),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    default_revalidate_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTagsSettings {
    popular_limit: Option<u64>,
    revalidate_seconds: Option<u64>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Zero is allowed and disables caching for the producers using it.
fn revalidate_seconds(value: u64, key: &'static str) -> Result<u64, LoadError> {
    if value > MAX_REVALIDATE_SECS {
        return Err(LoadError::invalid(
            key,
            format!("must not exceed {MAX_REVALIDATE_SECS} seconds (one year)"),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests;
