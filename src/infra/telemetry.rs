use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "folio_cache_hit_total",
            Unit::Count,
            "Total number of cache hits."
        );
        describe_counter!(
            "folio_cache_miss_total",
            Unit::Count,
            "Total number of cache misses."
        );
        describe_counter!(
            "folio_cache_set_total",
            Unit::Count,
            "Total number of cache writes."
        );
        describe_counter!(
            "folio_cache_corrupt_total",
            Unit::Count,
            "Total number of cache entries dropped as undecodable."
        );
        describe_counter!(
            "folio_cache_invalidation_total",
            Unit::Count,
            "Total number of keys removed by invalidation."
        );
        describe_counter!(
            "folio_cache_read_error_total",
            Unit::Count,
            "Total number of cache reads that failed and fell through to the database."
        );
        describe_counter!(
            "folio_cache_invalidation_error_total",
            Unit::Count,
            "Total number of post-commit invalidations that failed."
        );
        describe_counter!(
            "folio_http_rate_limited_total",
            Unit::Count,
            "Total number of requests rejected by the rate limiter."
        );
        describe_gauge!(
            "folio_cache_memory_used_percent",
            Unit::Percent,
            "Cache backend memory usage as a share of its configured limit."
        );
    });
}
