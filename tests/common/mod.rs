//! Shared test infrastructure: a durable store with injectable faults.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use breachcache::partition::{
    ActorRegistry, DurableStore, MemoryStore, PartitionConfig, PartitionError, PartitionResult,
};
use breachcache::types::{PartitionKey, SourceTag};

/// Memory-backed store whose loads and saves can be delayed, stalled or failed.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    pub loads: AtomicU32,
    pub save_attempts: AtomicU32,
    pub saves: AtomicU32,
    load_failures: AtomicU32,
    fail_saves: AtomicBool,
    stall_saves: AtomicBool,
    load_delay_ms: AtomicU64,
    save_delay_ms: AtomicU64,
}

impl FaultyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `n` load attempts with a retriable storage error.
    pub fn fail_next_loads(&self, n: u32) {
        self.load_failures.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Saves never complete while stalled.
    pub fn set_stall_saves(&self, stall: bool) {
        self.stall_saves.store(stall, Ordering::SeqCst);
    }

    pub fn set_load_delay(&self, delay: Duration) {
        self.load_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_save_delay(&self, delay: Duration) {
        self.save_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn records(&self) -> usize {
        self.inner.len()
    }

    pub async fn raw(&self, key: &PartitionKey) -> Option<Bytes> {
        self.inner.load(key).await.ok().flatten()
    }

    /// Poll until at least `n` saves have started.
    pub async fn wait_for_save_attempts(&self, n: u32) {
        while self.save_attempts.load(Ordering::SeqCst) < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl DurableStore for FaultyStore {
    fn source_tag(&self) -> SourceTag {
        SourceTag::Memory
    }

    async fn load(&self, key: &PartitionKey) -> PartitionResult<Option<Bytes>> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        let delay = self.load_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let injected = self
            .load_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(PartitionError::Storage("injected load failure".to_string()));
        }

        self.inner.load(key).await
    }

    async fn save(&self, key: &PartitionKey, payload: Bytes) -> PartitionResult<()> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);

        if self.stall_saves.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let delay = self.save_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PartitionError::Storage("injected save failure".to_string()));
        }

        self.inner.save(key, payload).await?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Short timeouts so failure paths resolve quickly.
pub fn test_config() -> PartitionConfig {
    PartitionConfig {
        checkpoint_interval: Duration::from_secs(60),
        store_timeout: Duration::from_secs(1),
        activation_timeout: Duration::from_secs(5),
        deactivation_grace: Duration::from_secs(2),
        idle_timeout: Duration::from_secs(300),
        idle_check_interval: Duration::from_secs(30),
        ..Default::default()
    }
}

pub fn registry_with(store: Arc<dyn DurableStore>) -> Arc<ActorRegistry> {
    ActorRegistry::new(test_config(), store)
}
