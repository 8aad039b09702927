//! Prometheus metrics for partition actors and the HTTP surface.
//!
//! Metrics cover:
//! - Actor lifecycle (resident actors, activations, deactivations)
//! - Checkpoints (results, duration)
//! - Check/Add operations
//! - Store retries and HTTP requests
//!
//! Everything lives in a dedicated registry whose names carry the
//! `breachcache_` prefix. A metric that fails to register stays usable but
//! is not exported.

use once_cell::sync::Lazy;
use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder, opts,
};
use tracing::warn;

/// Custom Prometheus registry for breachcache metrics.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("breachcache".to_string()), None).unwrap_or_else(|_| Registry::new())
});

/// Declare a lazily registered metric of type `$ty` built by `$ctor`.
macro_rules! metric {
    ($name:ident: $ty:ty, $help:expr, $ctor:expr) => {
        #[doc = $help]
        pub static $name: Lazy<$ty> = Lazy::new(|| {
            let metric: $ty = $ctor.expect("static metric definition is valid");
            register_or_detached(&REGISTRY, metric)
        });
    };
}

macro_rules! define_gauge {
    ($name:ident, $metric_name:expr, $help:expr) => {
        metric!($name: IntGauge, $help, IntGauge::new($metric_name, $help));
    };
}

macro_rules! define_counter {
    ($name:ident, $metric_name:expr, $help:expr) => {
        metric!($name: IntCounter, $help, IntCounter::new($metric_name, $help));
    };
}

macro_rules! define_counter_vec {
    ($name:ident, $metric_name:expr, $help:expr, [$($label:expr),+ $(,)?]) => {
        metric!(
            $name: IntCounterVec,
            $help,
            IntCounterVec::new(opts!($metric_name, $help), &[$($label),+])
        );
    };
}

macro_rules! define_histogram_vec {
    ($name:ident, $metric_name:expr, $help:expr, [$($label:expr),+ $(,)?], [$($bucket:expr),+ $(,)?]) => {
        metric!(
            $name: HistogramVec,
            $help,
            HistogramVec::new(
                HistogramOpts::new($metric_name, $help).buckets(vec![$($bucket),+]),
                &[$($label),+]
            )
        );
    };
}

// =============================================================================
// Lifecycle metrics
// =============================================================================

define_gauge!(
    ACTIVE_PARTITIONS,
    "active_partitions",
    "Number of partition actors currently resident"
);
define_counter_vec!(
    ACTIVATIONS,
    "activations_total",
    "Partition activations by result",
    ["result"]
);
define_counter_vec!(
    DEACTIVATIONS,
    "deactivations_total",
    "Partition deactivations by reason",
    ["reason"]
);

// =============================================================================
// Checkpoint metrics
// =============================================================================

define_counter_vec!(
    CHECKPOINTS,
    "checkpoints_total",
    "Checkpoint attempts by result (written, clean, failed, timeout)",
    ["result"]
);
define_histogram_vec!(
    CHECKPOINT_DURATION,
    "checkpoint_duration_seconds",
    "Time spent writing a checkpoint record",
    ["source"],
    [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
);
define_counter!(
    STORE_RETRIES,
    "store_retries_total",
    "Durable store operations retried after a transient failure"
);

// =============================================================================
// Operation metrics
// =============================================================================

define_counter_vec!(
    OPERATIONS,
    "operations_total",
    "Check/Add operations by outcome",
    ["op", "result"]
);
define_counter_vec!(
    HTTP_REQUESTS,
    "http_requests_total",
    "HTTP requests by route and status code",
    ["route", "status"]
);

/// Register `metric`, or keep it detached if registration fails (e.g. a
/// name collision). A detached metric still counts; it is just not scraped.
fn register_or_detached<M>(registry: &Registry, metric: M) -> M
where
    M: Collector + Clone + 'static,
{
    if let Err(e) = registry.register(Box::new(metric.clone())) {
        let name = metric
            .desc()
            .first()
            .map(|d| d.fq_name.clone())
            .unwrap_or_default();
        warn!(name = %name, error = %e, "Metric registration failed, recording detached");
    }
    metric
}

/// Force registration of every metric.
///
/// Idempotent. Metrics are otherwise registered lazily on first access, so
/// call this at startup to have every series present from the first scrape.
pub fn init_metrics() {
    let _ = &*ACTIVE_PARTITIONS;
    let _ = &*ACTIVATIONS;
    let _ = &*DEACTIVATIONS;
    let _ = &*CHECKPOINTS;
    let _ = &*CHECKPOINT_DURATION;
    let _ = &*STORE_RETRIES;
    let _ = &*OPERATIONS;
    let _ = &*HTTP_REQUESTS;
}

/// Render every registered series in the Prometheus text exposition format.
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let mut text = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut text)?;
    Ok(String::from_utf8(text)?)
}

/// Record a Check/Add outcome.
pub fn record_operation(op: &str, result: &str) {
    OPERATIONS.with_label_values(&[op, result]).inc();
}
