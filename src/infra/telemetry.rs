use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing::Subscriber;
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global tracing subscriber and register metric descriptions.
///
/// `RUST_LOG` directives refine `logging.level` when set.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    tracing_subscriber::registry()
        .with(env_filter(logging.level))
        .with(ErrorLayer::default())
        .with(fmt_layer(logging.format))
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .flatten_event(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    }
}

/// Register descriptions for every metric the crate emits. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "folio_cache_hit_total",
            Unit::Count,
            "Cached calls answered from a fresh entry."
        );
        describe_counter!(
            "folio_cache_miss_total",
            Unit::Count,
            "Cached calls that started or joined a producer invocation."
        );
        describe_counter!(
            "folio_cache_store_total",
            Unit::Count,
            "Producer results written to the cache store."
        );
        describe_counter!(
            "folio_cache_invalidate_total",
            Unit::Count,
            "Tag invalidations, labelled by tag."
        );
        describe_counter!(
            "folio_cache_producer_error_total",
            Unit::Count,
            "Producer invocations that failed; failures are never stored."
        );
        describe_counter!(
            "folio_cache_purge_total",
            Unit::Count,
            "Expired entries removed by the sweeper."
        );
        describe_counter!(
            "folio_tags_fallback_total",
            Unit::Count,
            "Popular-tag requests answered by the fallback strategy."
        );
        describe_histogram!(
            "folio_tags_aggregate_ms",
            Unit::Milliseconds,
            "Popular-tag aggregation latency in milliseconds, labelled by strategy."
        );
    });
}
