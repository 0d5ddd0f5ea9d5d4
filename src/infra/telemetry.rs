use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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

/// Register descriptions for every metric the cache emits. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "tagcache_gate_hit_total",
            Unit::Count,
            "Requests answered from the response cache."
        );
        describe_counter!(
            "tagcache_gate_miss_total",
            Unit::Count,
            "Lookups that found no live record."
        );
        describe_counter!(
            "tagcache_gate_denied_total",
            Unit::Count,
            "Cache hits withheld because the caller failed the route policy."
        );
        describe_counter!(
            "tagcache_backend_error_total",
            Unit::Count,
            "Cache backend failures absorbed by the gate."
        );
        describe_counter!(
            "tagcache_backend_evict_total",
            Unit::Count,
            "Entries evicted from the in-memory backend due to capacity."
        );
        describe_counter!(
            "tagcache_invalidated_keys_total",
            Unit::Count,
            "Cache records removed by tag invalidation."
        );
        describe_histogram!(
            "tagcache_invalidate_ms",
            Unit::Milliseconds,
            "Tag invalidation latency in milliseconds."
        );
    });
}
