use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::{
    cache::{METRIC_CACHE_CORRUPT, METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_WRITE_ERROR},
    config::{LogFormat, LoggingSettings},
};

use super::{
    error::InfraError,
    http::{METRIC_INTERCEPT, METRIC_PASSTHROUGH},
    prerender::{METRIC_RENDER_MS, METRIC_RENDER_UPSTREAM_ERROR},
};

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber writing to stderr.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(true)
            .boxed(),
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of renders served from the cache."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of renders that missed the cache."
        );
        describe_counter!(
            METRIC_CACHE_CORRUPT,
            Unit::Count,
            "Total number of cache entries discarded as unreadable."
        );
        describe_counter!(
            METRIC_CACHE_WRITE_ERROR,
            Unit::Count,
            "Total number of rendered snapshots that could not be cached."
        );
        describe_histogram!(
            METRIC_RENDER_MS,
            Unit::Milliseconds,
            "Render service latency in milliseconds."
        );
        describe_counter!(
            METRIC_RENDER_UPSTREAM_ERROR,
            Unit::Count,
            "Total number of failed or unreachable render service calls."
        );
        describe_counter!(
            METRIC_INTERCEPT,
            Unit::Count,
            "Total number of requests answered with a pre-rendered snapshot."
        );
        describe_counter!(
            METRIC_PASSTHROUGH,
            Unit::Count,
            "Total number of requests handed to the application."
        );
    });
}
