//! Retry policies for durable store I/O, built on `backon`.
//!
//! | Policy | Min Delay | Max Delay | Retries | Use Case |
//! |--------|-----------|-----------|---------|----------|
//! | `storage_policy` | 10ms | 500ms | 3 | rehydration loads |
//!
//! Checkpoint saves are not retried in place. A failed save leaves the state
//! dirty and the next timer tick writes it again.
//!
//! ```rust,no_run
//! use breachcache::partition::retry;
//! use backon::Retryable;
//!
//! async fn example() -> Result<(), std::io::Error> {
//!     (|| async { Ok::<_, std::io::Error>(()) })
//!         .retry(retry::storage_policy())
//!         .when(|e| e.kind() == std::io::ErrorKind::TimedOut)
//!         .await
//! }
//! ```

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

/// Policy for durable store reads.
///
/// Short initial delay for fast recovery from transient issues, few
/// retries since the whole activation is bounded by a timeout anyway.
pub fn storage_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(500))
        .with_max_times(3)
        .with_jitter()
}

/// Execute an async operation with the storage retry policy.
///
/// Each retry is counted in the `store_retries_total` metric.
pub async fn with_storage_policy<F, Fut, T, E, C>(operation: F, condition: C) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::error::Error,
    C: FnMut(&E) -> bool,
{
    operation
        .retry(storage_policy())
        .when(condition)
        .notify(|err: &E, delay: Duration| {
            super::metrics::STORE_RETRIES.inc();
            tracing::debug!(error = %err, delay_ms = delay.as_millis() as u64, "Retrying store operation");
        })
        .await
}
