//! Cache configuration.

use std::time::Duration;

pub(crate) const DEFAULT_REVALIDATE_SECS: u64 = 300;
pub(crate) const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
/// Longest revalidation window an entry may request (one year).
pub(crate) const MAX_REVALIDATE_SECS: u64 = 365 * 24 * 60 * 60;

/// Cache configuration resolved from [`crate::config::CacheSettings`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false, every cached producer is called directly.
    pub enabled: bool,
    /// Revalidation window for options built from [`crate::cache::CacheLayer::options`].
    pub default_revalidate_secs: u64,
    /// Interval of the expired-entry sweeper; zero disables it.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_revalidate_secs: DEFAULT_REVALIDATE_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            default_revalidate_secs: settings.default_revalidate.as_secs(),
            sweep_interval_secs: settings.sweep_interval.map_or(0, |every| every.as_secs()),
        }
    }
}

impl CacheConfig {
    pub fn default_revalidate(&self) -> Duration {
        Duration::from_secs(self.default_revalidate_secs.min(MAX_REVALIDATE_SECS))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}
