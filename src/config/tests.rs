use config::FileFormat;

use super::*;

fn settings_from_toml(source: &str) -> Result<Settings, LoadError> {
    let config = Config::builder()
        .add_source(File::from_str(source, FileFormat::Toml))
        .build()?;
    Settings::from_config(config)
}

#[test]
fn defaults_apply_without_sources() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.database.url.is_none());
    assert_eq!(settings.database.max_connections.get(), 8);
    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.default_revalidate, Duration::from_secs(300));
    assert_eq!(settings.cache.sweep_interval, Some(Duration::from_secs(60)));
    assert_eq!(settings.tags.popular_limit.get(), 10);
    assert_eq!(settings.tags.revalidate, Duration::from_secs(300));
}

#[test]
fn toml_sections_override_defaults() {
    let settings = settings_from_toml(
        r#"
        [logging]
        level = "debug"
        json = true

        [database]
        url = "  postgres://localhost/folio  "
        max_connections = 4

        [cache]
        enabled = false
        default_revalidate_seconds = 30
        sweep_interval_seconds = 0

        [tags]
        popular_limit = 5
        revalidate_seconds = 0
        "#,
    )
    .expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(matches!(settings.logging.format, LogFormat::Json));
    assert_eq!(
        settings.database.url.as_deref(),
        Some("postgres://localhost/folio")
    );
    assert_eq!(settings.database.max_connections.get(), 4);
    assert!(!settings.cache.enabled);
    assert_eq!(settings.cache.default_revalidate, Duration::from_secs(30));
    assert_eq!(settings.cache.sweep_interval, None);
    assert_eq!(settings.tags.popular_limit.get(), 5);
    assert_eq!(settings.tags.revalidate, Duration::ZERO);
}

#[test]
fn blank_database_url_is_treated_as_missing() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn zero_pool_size_is_rejected() {
    let mut raw = RawSettings::default();
    raw.database.max_connections = Some(0);

    let error = Settings::from_raw(raw).expect_err("zero pool");
    assert!(matches!(
        error,
        LoadError::Invalid {
            key: "database.max_connections",
            ..
        }
    ));
}

#[test]
fn zero_popular_limit_is_rejected() {
    let mut raw = RawSettings::default();
    raw.tags.popular_limit = Some(0);

    let error = Settings::from_raw(raw).expect_err("zero limit");
    assert!(matches!(
        error,
        LoadError::Invalid {
            key: "tags.popular_limit",
            ..
        }
    ));
}

#[test]
fn revalidate_longer_than_a_year_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.default_revalidate_seconds = Some(MAX_REVALIDATE_SECS + 1);

    let error = Settings::from_raw(raw).expect_err("too long");
    assert!(matches!(
        error,
        LoadError::Invalid {
            key: "cache.default_revalidate_seconds",
            ..
        }
    ));
}

#[test]
fn unknown_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    let error = Settings::from_raw(raw).expect_err("bad level");
    assert!(matches!(
        error,
        LoadError::Invalid {
            key: "logging.level",
            ..
        }
    ));
}

#[test]
fn cache_config_follows_settings() {
    let mut raw = RawSettings::default();
    raw.cache.sweep_interval_seconds = Some(0);
    raw.cache.default_revalidate_seconds = Some(45);

    let settings = Settings::from_raw(raw).expect("valid settings");
    let config = crate::cache::CacheConfig::from(&settings.cache);
    assert!(config.enabled);
    assert_eq!(config.default_revalidate(), Duration::from_secs(45));
    assert_eq!(config.sweep_interval(), None);
}
