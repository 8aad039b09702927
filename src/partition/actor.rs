//! Partition actor: the single writer for one partition key.
//!
//! # Lifecycle
//!
//! ```text
//! Activating ──rehydrate──> Active ──idle/shutdown──> Deactivating ──> Inactive
//!      │                                                   │
//!      └── load failed: never becomes Active               └── stop timer, final flush
//! ```
//!
//! # Concurrency
//!
//! Every `check`/`add` runs under the actor's state lock, so operations on
//! one actor are totally ordered. The lock is FIFO-fair and scoped to the
//! actor; different partitions never contend.
//!
//! Checkpoints take the state lock only long enough to snapshot dirty state.
//! The store write happens outside the lock behind a separate flush lock, so
//! a stalled store never delays `check`/`add`, and two flushes of the same
//! partition never overlap.
//!
//! # Durability
//!
//! `add` acknowledges before anything is written. The state is flushed every
//! checkpoint interval and once more on deactivation (bounded by the grace
//! period). A crash loses at most one interval of acknowledged adds.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, error, info, warn};

use super::checkpoint::{CheckpointScheduler, CheckpointTarget};
use super::config::PartitionConfig;
use super::error::{PartitionError, PartitionResult};
use super::metrics::{ACTIVATIONS, CHECKPOINTS, CHECKPOINT_DURATION, DEACTIVATIONS};
use super::retry::with_storage_policy;
use super::state::PartitionState;
use super::store::{CheckpointRecord, DurableStore};
use crate::types::{CheckResult, PartitionKey, SourceTag};

/// Lifecycle state of a partition actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorStatus {
    Activating,
    Active,
    Deactivating,
    Inactive,
}

impl ActorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorStatus::Activating => "activating",
            ActorStatus::Active => "active",
            ActorStatus::Deactivating => "deactivating",
            ActorStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for ActorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an actor was deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationReason {
    /// No traffic for longer than the idle timeout.
    Idle,
    /// Evicted to stay under the active partition limit.
    Capacity,
    /// Host shutdown.
    Shutdown,
    /// Requested by a caller.
    Explicit,
}

impl DeactivationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeactivationReason::Idle => "idle",
            DeactivationReason::Capacity => "capacity",
            DeactivationReason::Shutdown => "shutdown",
            DeactivationReason::Explicit => "explicit",
        }
    }
}

/// Result of one checkpoint attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// Nothing was pending.
    Clean,
    /// A record with `emails` entries covering mutations up to `seq` was written.
    Written { emails: usize, seq: u64 },
}

/// Point-in-time diagnostics for one actor.
#[derive(Debug, Clone)]
pub struct ActorStats {
    pub key: PartitionKey,
    pub status: ActorStatus,
    pub emails: usize,
    pub dirty: bool,
    pub last_checkpoint: Option<DateTime<Utc>>,
    pub checkpoint_failures: u64,
    pub idle: Duration,
}

/// Timeouts the actor needs from [`PartitionConfig`].
#[derive(Debug, Clone, Copy)]
struct ActorTimeouts {
    checkpoint_interval: Duration,
    store_timeout: Duration,
    activation_timeout: Duration,
    deactivation_grace: Duration,
}

impl From<&PartitionConfig> for ActorTimeouts {
    fn from(config: &PartitionConfig) -> Self {
        Self {
            checkpoint_interval: config.checkpoint_interval,
            store_timeout: config.store_timeout,
            activation_timeout: config.activation_timeout,
            deactivation_grace: config.deactivation_grace,
        }
    }
}

/// State guarded by the actor lock. Status lives next to the data so an
/// operation and a deactivation can never both observe `Active`.
struct Guarded {
    state: PartitionState,
    status: ActorStatus,
}

pub struct PartitionActor {
    key: PartitionKey,
    store: Arc<dyn DurableStore>,
    timeouts: ActorTimeouts,
    guarded: Mutex<Guarded>,
    flush_lock: Mutex<()>,
    status_tx: watch::Sender<ActorStatus>,
    scheduler: Mutex<Option<CheckpointScheduler>>,
    /// Reference point for `last_access_ms`.
    epoch: Instant,
    last_access_ms: AtomicU64,
    checkpoint_failures: AtomicU64,
    last_checkpoint: std::sync::Mutex<Option<DateTime<Utc>>>,
}

impl PartitionActor {
    fn new(key: PartitionKey, store: Arc<dyn DurableStore>, timeouts: ActorTimeouts) -> Self {
        let (status_tx, _) = watch::channel(ActorStatus::Activating);
        Self {
            key,
            store,
            timeouts,
            guarded: Mutex::new(Guarded {
                state: PartitionState::new(),
                status: ActorStatus::Activating,
            }),
            flush_lock: Mutex::new(()),
            status_tx,
            scheduler: Mutex::new(None),
            epoch: Instant::now(),
            last_access_ms: AtomicU64::new(0),
            checkpoint_failures: AtomicU64::new(0),
            last_checkpoint: std::sync::Mutex::new(None),
        }
    }

    /// Activate the actor for `key`.
    ///
    /// Rehydrates state from `store` (empty if no record exists), marks the
    /// actor active and starts its checkpoint timer. Load failures are retried
    /// with backoff inside the activation timeout; if rehydration still fails
    /// the actor is discarded and the error is returned.
    pub async fn activate(
        key: PartitionKey,
        store: Arc<dyn DurableStore>,
        config: &PartitionConfig,
    ) -> PartitionResult<Arc<Self>> {
        let started = Instant::now();
        let actor = Arc::new(Self::new(key, store, ActorTimeouts::from(config)));

        let state = match actor.rehydrate().await {
            Ok(state) => state,
            Err(e) => {
                ACTIVATIONS.with_label_values(&["failed"]).inc();
                warn!(partition = %actor.key, error = %e, "Partition activation failed");
                return Err(e);
            }
        };
        let emails = state.len();

        {
            let mut guarded = actor.guarded.lock().await;
            guarded.state = state;
            actor.set_status(&mut guarded, ActorStatus::Active);
        }
        actor.touch();

        let scheduler = CheckpointScheduler::start(&actor, actor.timeouts.checkpoint_interval);
        *actor.scheduler.lock().await = Some(scheduler);

        ACTIVATIONS.with_label_values(&["success"]).inc();
        info!(
            partition = %actor.key,
            emails,
            source = %actor.store.source_tag(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Partition activated"
        );
        Ok(actor)
    }

    async fn rehydrate(&self) -> PartitionResult<PartitionState> {
        let key = &self.key;
        let store = &self.store;
        let store_timeout = self.timeouts.store_timeout;

        let load = with_storage_policy(
            || async move {
                match timeout(store_timeout, store.load(key)).await {
                    Ok(result) => result,
                    Err(_) => Err(PartitionError::Timeout {
                        operation: "load",
                        key: key.clone(),
                        timeout: store_timeout,
                    }),
                }
            },
            |e: &PartitionError| e.is_retriable(),
        );

        let payload = match timeout(self.timeouts.activation_timeout, load).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                return Err(PartitionError::Rehydration {
                    key: key.clone(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(PartitionError::Rehydration {
                    key: key.clone(),
                    message: format!(
                        "activation timed out after {:?}",
                        self.timeouts.activation_timeout
                    ),
                });
            }
        };

        match payload {
            None => Ok(PartitionState::new()),
            Some(bytes) => {
                let record = CheckpointRecord::decode(key, &bytes)?;
                Ok(PartitionState::from_persisted(record.breached_emails))
            }
        }
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    pub fn source_tag(&self) -> SourceTag {
        self.store.source_tag()
    }

    pub fn status(&self) -> ActorStatus {
        *self.status_tx.borrow()
    }

    /// Subscribe to lifecycle transitions.
    pub fn watch_status(&self) -> watch::Receiver<ActorStatus> {
        self.status_tx.subscribe()
    }

    /// Wait until the actor has fully deactivated.
    pub async fn wait_inactive(&self) {
        let mut rx = self.watch_status();
        let _ = rx.wait_for(|status| *status == ActorStatus::Inactive).await;
    }

    fn set_status(&self, guarded: &mut Guarded, status: ActorStatus) {
        guarded.status = status;
        self.status_tx.send_replace(status);
    }

    /// Acquire the state lock for an operation, failing if not active.
    async fn lock_active(&self) -> PartitionResult<MutexGuard<'_, Guarded>> {
        let guarded = self.guarded.lock().await;
        if guarded.status != ActorStatus::Active {
            return Err(PartitionError::Deactivating {
                key: self.key.clone(),
            });
        }
        self.touch();
        Ok(guarded)
    }

    /// Case-insensitive membership test against resident state. No I/O.
    pub async fn check(&self, email: &str) -> PartitionResult<CheckResult> {
        let guarded = self.lock_active().await?;
        let present = guarded.state.contains(email);
        debug!(partition = %self.key, present, "check");
        Ok(CheckResult::new(present, self.store.source_tag()))
    }

    /// Add `email`. Returns false if it was already present.
    ///
    /// Marks the state dirty; the write reaches the store on the next checkpoint.
    pub async fn add(&self, email: &str) -> PartitionResult<bool> {
        let mut guarded = self.lock_active().await?;
        let added = guarded.state.insert(email);
        debug!(partition = %self.key, added, "add");
        Ok(added)
    }

    /// Number of emails currently resident.
    pub async fn breach_count(&self) -> usize {
        self.guarded.lock().await.state.len()
    }

    pub async fn is_dirty(&self) -> bool {
        self.guarded.lock().await.state.is_dirty()
    }

    /// Flush dirty state to the durable store.
    ///
    /// Snapshots under the state lock, then writes with only the flush lock
    /// held. The save is bounded by the store timeout. On failure the state
    /// stays dirty and the error is returned.
    pub async fn checkpoint(&self) -> PartitionResult<CheckpointOutcome> {
        let _flush = self.flush_lock.lock().await;

        let snapshot = self.guarded.lock().await.state.snapshot_if_dirty();
        let Some(snapshot) = snapshot else {
            CHECKPOINTS.with_label_values(&["clean"]).inc();
            return Ok(CheckpointOutcome::Clean);
        };

        let emails = snapshot.emails.len();
        let payload = CheckpointRecord::new(&self.key, &snapshot.emails).encode()?;
        let source = self.store.source_tag();
        let started = Instant::now();

        let result = timeout(self.timeouts.store_timeout, self.store.save(&self.key, payload)).await;
        CHECKPOINT_DURATION
            .with_label_values(&[source.as_str()])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(Ok(())) => {
                self.guarded.lock().await.state.mark_persisted(snapshot.seq);
                if let Ok(mut last) = self.last_checkpoint.lock() {
                    *last = Some(Utc::now());
                }
                CHECKPOINTS.with_label_values(&["written"]).inc();
                debug!(partition = %self.key, emails, seq = snapshot.seq, "Checkpoint written");
                Ok(CheckpointOutcome::Written {
                    emails,
                    seq: snapshot.seq,
                })
            }
            Ok(Err(e)) => {
                self.checkpoint_failures.fetch_add(1, Ordering::Relaxed);
                CHECKPOINTS.with_label_values(&["failed"]).inc();
                if e.is_permission_error() {
                    error!(partition = %self.key, error = %e, "Store rejected checkpoint credentials");
                }
                Err(PartitionError::CheckpointFailed {
                    key: self.key.clone(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                self.checkpoint_failures.fetch_add(1, Ordering::Relaxed);
                CHECKPOINTS.with_label_values(&["timeout"]).inc();
                Err(PartitionError::Timeout {
                    operation: "checkpoint",
                    key: self.key.clone(),
                    timeout: self.timeouts.store_timeout,
                })
            }
        }
    }

    /// First step of deactivation: stop accepting operations.
    ///
    /// Returns false if the actor was not active, in which case another
    /// caller owns the deactivation.
    pub(crate) async fn begin_deactivation(&self) -> bool {
        let mut guarded = self.guarded.lock().await;
        if guarded.status != ActorStatus::Active {
            return false;
        }
        self.set_status(&mut guarded, ActorStatus::Deactivating);
        true
    }

    /// Second step: cancel the timer and flush whatever is still dirty.
    ///
    /// Both steps share one deadline, the deactivation grace period. A timer
    /// flush caught mid-write gets half of it before being aborted. Returns
    /// true if nothing was left unpersisted.
    pub(crate) async fn final_flush(&self) -> bool {
        let grace = self.timeouts.deactivation_grace;
        let started = Instant::now();
        let deadline = started + grace;

        if let Some(scheduler) = self.scheduler.lock().await.take() {
            scheduler.stop_at(started + grace / 2).await;
        }

        match timeout_at(deadline, self.checkpoint()).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(partition = %self.key, error = %e, "Final checkpoint failed, unflushed adds are lost");
                false
            }
            Err(_) => {
                warn!(
                    partition = %self.key,
                    grace_ms = grace.as_millis() as u64,
                    "Final checkpoint exceeded grace period, unflushed adds are lost"
                );
                false
            }
        }
    }

    /// Last step: publish `Inactive` and wake waiters.
    pub(crate) async fn mark_inactive(&self, reason: DeactivationReason) {
        let mut guarded = self.guarded.lock().await;
        self.set_status(&mut guarded, ActorStatus::Inactive);
        DEACTIVATIONS.with_label_values(&[reason.as_str()]).inc();
        info!(
            partition = %self.key,
            reason = reason.as_str(),
            emails = guarded.state.len(),
            "Partition deactivated"
        );
    }

    /// Deactivate without a registry: stop accepting work, final flush,
    /// then go inactive. Returns false if the actor was already deactivating.
    pub async fn deactivate(&self, reason: DeactivationReason) -> bool {
        if !self.begin_deactivation().await {
            self.wait_inactive().await;
            return false;
        }
        self.final_flush().await;
        self.mark_inactive(reason).await;
        true
    }

    fn touch(&self) {
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        self.last_access_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// Time since the last check or add.
    pub fn idle_duration(&self) -> Duration {
        let last = self.last_access_ms.load(Ordering::Relaxed);
        self.epoch
            .elapsed()
            .saturating_sub(Duration::from_millis(last))
    }

    pub fn checkpoint_failures(&self) -> u64 {
        self.checkpoint_failures.load(Ordering::Relaxed)
    }

    pub async fn stats(&self) -> ActorStats {
        let (emails, dirty, status) = {
            let guarded = self.guarded.lock().await;
            (guarded.state.len(), guarded.state.is_dirty(), guarded.status)
        };
        ActorStats {
            key: self.key.clone(),
            status,
            emails,
            dirty,
            last_checkpoint: self.last_checkpoint.lock().ok().and_then(|last| *last),
            checkpoint_failures: self.checkpoint_failures(),
            idle: self.idle_duration(),
        }
    }
}

#[async_trait]
impl CheckpointTarget for PartitionActor {
    fn label(&self) -> String {
        self.key.to_string()
    }

    async fn run_checkpoint(&self) {
        if let Err(e) = self.checkpoint().await {
            warn!(partition = %self.key, error = %e, "Checkpoint failed, will retry on next tick");
        }
    }
}

impl fmt::Debug for PartitionActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionActor")
            .field("key", &self.key)
            .field("status", &self.status())
            .field("store", &self.store)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::store::MemoryStore;
    use bytes::Bytes;

    fn config() -> PartitionConfig {
        PartitionConfig {
            checkpoint_interval: Duration::from_secs(60),
            store_timeout: Duration::from_secs(1),
            activation_timeout: Duration::from_secs(2),
            deactivation_grace: Duration::from_secs(2),
            ..Default::default()
        }
    }

    fn key() -> PartitionKey {
        PartitionKey::from("p1")
    }

    #[tokio::test]
    async fn test_activate_empty_partition() {
        let store = Arc::new(MemoryStore::new());
        let actor = PartitionActor::activate(key(), store, &config()).await.unwrap();
        assert_eq!(actor.status(), ActorStatus::Active);
        assert_eq!(actor.breach_count().await, 0);
        assert!(!actor.is_dirty().await);
    }

    #[tokio::test]
    async fn test_add_then_check() {
        let store = Arc::new(MemoryStore::new());
        let actor = PartitionActor::activate(key(), store, &config()).await.unwrap();

        assert!(actor.add("User@Example.com").await.unwrap());
        assert!(!actor.add("user@example.com").await.unwrap());

        let result = actor.check("USER@example.COM").await.unwrap();
        assert!(result.is_pwned);
        assert_eq!(result.breach_count, 1);
        assert_eq!(result.source, SourceTag::Memory);
        assert!(actor.is_dirty().await);
    }

    #[tokio::test]
    async fn test_checkpoint_cleans_state() {
        let store = Arc::new(MemoryStore::new());
        let actor = PartitionActor::activate(key(), store.clone(), &config())
            .await
            .unwrap();

        assert_eq!(actor.checkpoint().await.unwrap(), CheckpointOutcome::Clean);
        actor.add("a@x.com").await.unwrap();
        assert_eq!(
            actor.checkpoint().await.unwrap(),
            CheckpointOutcome::Written { emails: 1, seq: 1 }
        );
        assert!(!actor.is_dirty().await);
        assert_eq!(store.len(), 1);
        assert!(actor.stats().await.last_checkpoint.is_some());
    }

    #[tokio::test]
    async fn test_rehydrates_from_store() {
        let store = Arc::new(MemoryStore::new());
        let record = CheckpointRecord::new(&key(), &vec!["a@x.com".to_string()]);
        store.save(&key(), record.encode().unwrap()).await.unwrap();

        let actor = PartitionActor::activate(key(), store, &config()).await.unwrap();
        assert!(actor.check("A@x.com").await.unwrap().is_pwned);
        assert!(!actor.is_dirty().await);
    }

    #[tokio::test]
    async fn test_corrupt_record_fails_activation() {
        let store = Arc::new(MemoryStore::new());
        store.save(&key(), Bytes::from_static(b"{oops")).await.unwrap();

        let err = PartitionActor::activate(key(), store, &config()).await.unwrap_err();
        assert!(matches!(err, PartitionError::Serde(_)));
    }

    #[tokio::test]
    async fn test_deactivate_flushes_and_rejects_operations() {
        let store = Arc::new(MemoryStore::new());
        let actor = PartitionActor::activate(key(), store.clone(), &config())
            .await
            .unwrap();
        actor.add("a@x.com").await.unwrap();

        assert!(actor.deactivate(DeactivationReason::Explicit).await);
        assert_eq!(actor.status(), ActorStatus::Inactive);
        assert_eq!(store.len(), 1);

        let err = actor.check("a@x.com").await.unwrap_err();
        assert!(matches!(err, PartitionError::Deactivating { .. }));
        assert!(!actor.deactivate(DeactivationReason::Explicit).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_duration_tracks_access() {
        let store = Arc::new(MemoryStore::new());
        let actor = PartitionActor::activate(key(), store, &config()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(actor.idle_duration() >= Duration::from_secs(30));

        actor.check("a@x.com").await.unwrap();
        assert!(actor.idle_duration() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flushes_dirty_state() {
        let store = Arc::new(MemoryStore::new());
        let actor = PartitionActor::activate(key(), store.clone(), &config())
            .await
            .unwrap();
        actor.add("a@x.com").await.unwrap();
        assert!(store.is_empty());

        // One jittered interval is at most 69s.
        tokio::time::sleep(Duration::from_secs(70)).await;
        assert_eq!(store.len(), 1);
        assert!(!actor.is_dirty().await);
    }
}
