//! Recurring checkpoint task owned by one partition actor.
//!
//! The scheduler is decoupled from request traffic: it ticks on its own
//! tokio task, so a slow store write never sits in front of a Check or Add.
//! Worst-case data loss on a crash is bounded by one interval.
//!
//! The task holds only a [`Weak`] reference to its target and stops on its
//! own once the target is dropped. [`CheckpointScheduler::stop`] signals the
//! task and waits for an in-flight flush up to a grace period, then aborts.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Something that can be checkpointed on a timer.
#[async_trait]
pub trait CheckpointTarget: Send + Sync + 'static {
    /// Short identity used in log fields.
    fn label(&self) -> String;

    /// Run one checkpoint. Errors are the target's to report; the scheduler
    /// just keeps ticking.
    async fn run_checkpoint(&self);
}

/// Adds +/- 15% pseudo-random jitter to a base interval.
///
/// Partitions activated together (e.g. after a restart) would otherwise all
/// hit the store on the same tick.
pub(crate) fn with_jitter(base: Duration) -> Duration {
    let jitter_factor = 0.85 + fastrand::f64() * 0.30;
    Duration::from_secs_f64(base.as_secs_f64() * jitter_factor)
}

/// Handle to a running checkpoint task.
pub struct CheckpointScheduler {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
    interval: Duration,
}

impl CheckpointScheduler {
    /// Start ticking every `interval` against `target`.
    ///
    /// The first tick is jittered; subsequent ticks follow at a fixed period.
    /// A tick that overruns delays the next one instead of bursting.
    pub fn start<T: CheckpointTarget>(target: &Arc<T>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let weak: Weak<T> = Arc::downgrade(target);
        let label = target.label();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + with_jitter(interval), interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(partition = %label, "Checkpoint scheduler received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(target) = weak.upgrade() else {
                            debug!(partition = %label, "Checkpoint target dropped, stopping scheduler");
                            break;
                        };
                        target.run_checkpoint().await;
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task.
    ///
    /// Waits up to `grace` for a checkpoint that is already running to finish,
    /// then aborts the task. Returns true if the task exited on its own.
    pub async fn stop(self, grace: Duration) -> bool {
        self.stop_at(Instant::now() + grace).await
    }

    /// Like [`stop`](Self::stop), but waits only until `deadline`.
    ///
    /// An aborted checkpoint never marks its snapshot persisted, so the
    /// partition stays dirty for whoever flushes next.
    pub async fn stop_at(mut self, deadline: Instant) -> bool {
        let _ = self.shutdown_tx.send(());
        match tokio::time::timeout_at(deadline, &mut self.handle).await {
            Ok(_) => true,
            Err(_) => {
                warn!("Checkpoint task did not stop before deadline, aborting");
                self.handle.abort();
                let _ = (&mut self.handle).await;
                false
            }
        }
    }
}

impl std::fmt::Debug for CheckpointScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointScheduler")
            .field("interval", &self.interval)
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}
