//! Registry mapping partition keys to live actors.
//!
//! # Single activation per key
//!
//! Each key maps to an [`ActorSlot`] holding a `tokio::sync::OnceCell`.
//! Resolvers obtain the slot through `DashMap::entry` (per-shard lock, never
//! held across an await) and then race on `get_or_try_init`: exactly one
//! runs the activation, the rest wait for it. Concurrent resolves for
//! different keys only contend on a shard lock for the map lookup.
//!
//! # Deactivation
//!
//! ```text
//! begin_deactivation   status -> Deactivating, new ops rejected
//! final_flush          timer cancelled, dirty state written (bounded by grace)
//! unregister           slot removed, only if it is still the same slot
//! mark_inactive        status -> Inactive, waiting callers re-resolve
//! ```
//!
//! Callers whose operation hit a deactivating actor wait for `Inactive` and
//! resolve again. Because the slot is gone by then, they land on a fresh
//! activation that rehydrates from the record the final flush just wrote.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::{Mutex, OnceCell, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::actor::{ActorStats, ActorStatus, DeactivationReason, PartitionActor};
use super::checkpoint::with_jitter;
use super::config::PartitionConfig;
use super::error::{PartitionError, PartitionResult};
use super::metrics::ACTIVE_PARTITIONS;
use super::store::DurableStore;
use crate::constants::MAX_REACTIVATION_ATTEMPTS;
use crate::types::{CheckResult, PartitionKey};

/// Registry entry for one key. Empty while the first activation is running
/// or after a failed one.
#[derive(Default)]
struct ActorSlot {
    cell: OnceCell<Arc<PartitionActor>>,
}

pub struct ActorRegistry {
    actors: DashMap<PartitionKey, Arc<ActorSlot>>,
    store: Arc<dyn DurableStore>,
    config: PartitionConfig,
    shutting_down: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ActorRegistry {
    pub fn new(config: PartitionConfig, store: Arc<dyn DurableStore>) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(Self {
            actors: DashMap::new(),
            store,
            config,
            shutting_down: AtomicBool::new(false),
            shutdown_tx,
            sweeper: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Start the idle sweeper.
    pub async fn start(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_some() {
            return;
        }
        *sweeper = Some(self.start_idle_sweeper());
        info!(
            idle_timeout_secs = self.config.idle_timeout.as_secs(),
            max_active_partitions = self.config.max_active_partitions,
            store = %self.store.source_tag(),
            "Actor registry started"
        );
    }

    fn start_idle_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.idle_check_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(with_jitter(interval)) => {},
                    _ = shutdown_rx.recv() => {
                        debug!("Idle sweeper received shutdown signal");
                        break;
                    }
                }

                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let evicted = registry.sweep().await;
                if evicted > 0 {
                    debug!(evicted, remaining = registry.len(), "Idle sweep complete");
                }
            }
        })
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Return the live actor for `key`, activating it if needed.
    ///
    /// Concurrent calls for the same key share one activation. A failed
    /// activation is returned to every waiter that did not retry it; the
    /// next call tries again.
    pub async fn resolve(&self, key: &PartitionKey) -> PartitionResult<Arc<PartitionActor>> {
        if self.is_shutting_down() {
            return Err(PartitionError::ShuttingDown);
        }

        let slot = self
            .actors
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ActorSlot::default()))
            .value()
            .clone();

        let result = slot
            .cell
            .get_or_try_init(|| async {
                let actor =
                    PartitionActor::activate(key.clone(), self.store.clone(), &self.config).await?;
                ACTIVE_PARTITIONS.inc();
                Ok::<_, PartitionError>(actor)
            })
            .await;

        match result {
            Ok(actor) => {
                let actor = actor.clone();
                if self.is_shutting_down() {
                    // Activation raced with shutdown and missed its sweep.
                    self.deactivate_slot(key, &slot, &actor, DeactivationReason::Shutdown)
                        .await;
                    return Err(PartitionError::ShuttingDown);
                }
                Ok(actor)
            }
            Err(e) => {
                // Drop the empty slot unless another resolver is still using it;
                // it may be retrying the activation right now.
                self.actors.remove_if(key, |_, s| {
                    Arc::ptr_eq(s, &slot) && !s.cell.initialized() && Arc::strong_count(s) == 2
                });
                Err(e)
            }
        }
    }

    /// Run `op` against the actor for `key`, following it across
    /// deactivations.
    ///
    /// If the actor is deactivating, wait until it is gone and resolve again,
    /// so the operation lands on a fresh activation instead of being dropped.
    pub async fn with_actor<T, F, Fut>(&self, key: &PartitionKey, op: F) -> PartitionResult<T>
    where
        F: Fn(Arc<PartitionActor>) -> Fut,
        Fut: Future<Output = PartitionResult<T>>,
    {
        let mut attempts = 0;
        loop {
            let actor = self.resolve(key).await?;
            match op(actor.clone()).await {
                Err(PartitionError::Deactivating { .. }) if attempts < MAX_REACTIVATION_ATTEMPTS => {
                    attempts += 1;
                    debug!(partition = %key, attempts, "Actor deactivating, re-resolving");
                    actor.wait_inactive().await;
                }
                other => return other,
            }
        }
    }

    pub async fn check(&self, key: &PartitionKey, email: &str) -> PartitionResult<CheckResult> {
        self.with_actor(key, |actor| async move { actor.check(email).await })
            .await
    }

    pub async fn add(&self, key: &PartitionKey, email: &str) -> PartitionResult<bool> {
        self.with_actor(key, |actor| async move { actor.add(email).await })
            .await
    }

    /// Deactivate the actor for `key` if one is live.
    ///
    /// Returns true if this call performed the deactivation.
    pub async fn deactivate(&self, key: &PartitionKey, reason: DeactivationReason) -> bool {
        let Some(slot) = self.actors.get(key).map(|entry| entry.value().clone()) else {
            return false;
        };
        let Some(actor) = slot.cell.get().cloned() else {
            return false;
        };
        self.deactivate_slot(key, &slot, &actor, reason).await
    }

    async fn deactivate_slot(
        &self,
        key: &PartitionKey,
        slot: &Arc<ActorSlot>,
        actor: &Arc<PartitionActor>,
        reason: DeactivationReason,
    ) -> bool {
        if !actor.begin_deactivation().await {
            actor.wait_inactive().await;
            return false;
        }
        actor.final_flush().await;
        self.unregister(key, slot);
        ACTIVE_PARTITIONS.dec();
        actor.mark_inactive(reason).await;
        true
    }

    /// Remove `slot` from the map if it is still the registered slot for `key`.
    fn unregister(&self, key: &PartitionKey, slot: &Arc<ActorSlot>) -> bool {
        self.actors
            .remove_if(key, |_, current| Arc::ptr_eq(current, slot))
            .is_some()
    }

    fn live_actors(&self) -> Vec<(PartitionKey, Arc<ActorSlot>, Arc<PartitionActor>)> {
        self.actors
            .iter()
            .filter_map(|entry| {
                let actor = entry.value().cell.get()?.clone();
                (actor.status() == ActorStatus::Active)
                    .then(|| (entry.key().clone(), entry.value().clone(), actor))
            })
            .collect()
    }

    /// One pass of idle and capacity eviction. Returns the number of actors
    /// deactivated.
    pub async fn sweep(&self) -> usize {
        // Empty slots nobody is activating into.
        self.actors
            .retain(|_, slot| slot.cell.initialized() || Arc::strong_count(slot) > 1);

        let idle_timeout = self.config.idle_timeout;
        let mut live: Vec<_> = self
            .live_actors()
            .into_iter()
            .map(|(key, slot, actor)| {
                let idle = actor.idle_duration();
                (key, slot, actor, idle)
            })
            .collect();

        // Most idle first.
        live.sort_by(|a, b| b.3.cmp(&a.3));

        let idle_count = live.iter().take_while(|(.., idle)| *idle >= idle_timeout).count();
        let over_capacity = live
            .len()
            .saturating_sub(idle_count)
            .saturating_sub(self.config.max_active_partitions);

        let evictions: Vec<_> = live
            .iter()
            .take(idle_count + over_capacity)
            .enumerate()
            .map(|(i, (key, slot, actor, idle))| {
                let reason = if i < idle_count {
                    DeactivationReason::Idle
                } else {
                    DeactivationReason::Capacity
                };
                debug!(partition = %key, idle_secs = idle.as_secs(), reason = reason.as_str(), "Evicting partition");
                self.deactivate_slot(key, slot, actor, reason)
            })
            .collect();

        if over_capacity > 0 {
            warn!(
                over_capacity,
                limit = self.config.max_active_partitions,
                "Active partition limit exceeded, evicting least recently used"
            );
        }

        join_all(evictions).await.into_iter().filter(|done| *done).count()
    }

    /// Stop the sweeper and deactivate every live actor.
    ///
    /// All actors flush concurrently. Afterwards `resolve` returns
    /// [`PartitionError::ShuttingDown`].
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(partitions = self.len(), "Shutting down actor registry");

        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.sweeper.lock().await.take() {
            match tokio::time::timeout(self.config.deactivation_grace, handle).await {
                Ok(_) => debug!("Idle sweeper stopped"),
                Err(_) => warn!("Idle sweeper did not stop within grace period"),
            }
        }

        let live = self.live_actors();
        let deactivations: Vec<_> = live
            .iter()
            .map(|(key, slot, actor)| {
                self.deactivate_slot(key, slot, actor, DeactivationReason::Shutdown)
            })
            .collect();
        let flushed = join_all(deactivations).await.into_iter().filter(|done| *done).count();

        info!(flushed, "Actor registry shutdown complete");
    }

    /// Number of activated actors.
    pub fn len(&self) -> usize {
        self.actors
            .iter()
            .filter(|entry| entry.value().cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if an active actor exists for `key`.
    pub fn contains(&self, key: &PartitionKey) -> bool {
        self.actors
            .get(key)
            .and_then(|entry| entry.value().cell.get().map(|a| a.status() == ActorStatus::Active))
            .unwrap_or(false)
    }

    pub async fn stats(&self) -> Vec<ActorStats> {
        let actors: Vec<_> = self
            .actors
            .iter()
            .filter_map(|entry| entry.value().cell.get().cloned())
            .collect();
        join_all(actors.iter().map(|actor| actor.stats())).await
    }
}

impl std::fmt::Debug for ActorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorRegistry")
            .field("actors", &self.actors.len())
            .field("store", &self.store)
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}
