//! Centralized timing and sizing constants.
//!
//! Every default interval, timeout and limit used by the partition actors,
//! the registry and the HTTP surface lives here so the values can be reviewed
//! in one place and referenced by both [`PartitionConfig`] defaults and tests.
//!
//! # Categories
//!
//! - **Checkpoint Constants**: write-back cadence and store I/O bounds
//! - **Lifecycle Constants**: activation, deactivation and idle eviction
//! - **Server Constants**: HTTP listener limits
//!
//! [`PartitionConfig`]: crate::partition::PartitionConfig

// =============================================================================
// Checkpoint Constants
// =============================================================================

/// Default period between two checkpoint ticks of one partition actor.
///
/// This is also the upper bound of the acknowledged-write loss window: an
/// `add` that returned `true` is durable at the latest one interval later,
/// unless the process crashes first.
pub const DEFAULT_CHECKPOINT_INTERVAL_MS: u64 = 60_000;

/// Default upper bound for a single durable store `load` or `save`.
///
/// A save that exceeds this is abandoned and retried on the next tick.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

/// Default object-store prefix under which checkpoint records are written.
pub const DEFAULT_STORE_PREFIX: &str = "partitions";

/// Default local data directory for the filesystem-backed store.
pub const DEFAULT_DATA_PATH: &str = "/tmp/breachcache-data";

// =============================================================================
// Lifecycle Constants
// =============================================================================

/// Default upper bound for rehydrating a partition during activation.
///
/// Includes retries of the underlying store load.
pub const DEFAULT_ACTIVATION_TIMEOUT_MS: u64 = 10_000;

/// Default grace period for the final flush performed on deactivation.
///
/// After this the actor deactivates anyway; persistence is best-effort.
pub const DEFAULT_DEACTIVATION_GRACE_MS: u64 = 10_000;

/// Default idle time after which a partition actor is evicted from memory.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Default interval between idle-eviction sweeps.
pub const DEFAULT_IDLE_CHECK_INTERVAL_SECS: u64 = 30;

/// Default maximum number of partition actors kept resident at once.
///
/// When exceeded, the sweeper deactivates the least recently used actors.
pub const DEFAULT_MAX_ACTIVE_PARTITIONS: usize = 10_000;

/// How many times an operation is re-routed when it races a deactivation.
///
/// Each retry waits for the old actor to become inactive first, so this only
/// bounds pathological eviction churn.
pub const MAX_REACTIVATION_ATTEMPTS: usize = 8;

// =============================================================================
// Server Constants
// =============================================================================

/// Default HTTP listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Maximum size of an HTTP request head the server reads.
pub const MAX_REQUEST_HEAD_SIZE: usize = 8 * 1024;

/// Timeout for reading a request from a connection.
pub const DEFAULT_REQUEST_READ_TIMEOUT_SECS: u64 = 30;

/// API version reported in every response envelope.
pub const API_VERSION: &str = "1.0";
