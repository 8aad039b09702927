//! Durable stores for partition checkpoints.
//!
//! A [`DurableStore`] maps a [`PartitionKey`] to one serialized
//! [`CheckpointRecord`]. Records are written wholesale (replace, not patch)
//! and the last write wins.
//!
//! Two implementations are provided:
//!
//! - [`MemoryStore`]: volatile, process-local (`DashMap`)
//! - [`ObjectStoreBackend`]: persistent, any `object_store` backend
//!   (local filesystem, S3, GCS, Azure)
//!
//! The backend is chosen once from [`StoreType`] by [`build_store`] and
//! injected into the registry; partition actors never branch on it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use object_store::{ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::{PartitionConfig, StoreType};
use super::error::{PartitionError, PartitionResult};
use super::keys;
use crate::email::normalize;
use crate::types::{PartitionKey, SourceTag};

/// Key-value backend holding one checkpoint blob per partition.
#[async_trait]
pub trait DurableStore: Send + Sync + fmt::Debug {
    /// Backend identity reported to callers of `check`.
    fn source_tag(&self) -> SourceTag;

    /// Read the blob for `key`, or `None` if the partition was never checkpointed.
    async fn load(&self, key: &PartitionKey) -> PartitionResult<Option<Bytes>>;

    /// Replace the blob for `key`.
    async fn save(&self, key: &PartitionKey, payload: Bytes) -> PartitionResult<()>;
}

/// Durable representation of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub partition_key: String,
    /// Sorted so identical states produce identical blobs.
    pub breached_emails: Vec<String>,
    pub saved_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn new<'a>(key: &PartitionKey, emails: impl IntoIterator<Item = &'a String>) -> Self {
        let mut breached_emails: Vec<String> = emails.into_iter().cloned().collect();
        breached_emails.sort_unstable();
        Self {
            partition_key: key.as_str().to_string(),
            breached_emails,
            saved_at: Utc::now(),
        }
    }

    pub fn encode(&self) -> PartitionResult<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decode a blob loaded for `key`.
    ///
    /// Rejects records written for a different partition. Emails are
    /// re-normalized so a hand-edited record cannot introduce case duplicates.
    pub fn decode(key: &PartitionKey, payload: &[u8]) -> PartitionResult<Self> {
        let mut record: CheckpointRecord = serde_json::from_slice(payload)?;
        if record.partition_key != key.as_str() {
            return Err(PartitionError::CorruptRecord {
                key: key.clone(),
                message: format!("record belongs to partition {}", record.partition_key),
            });
        }
        let unique: HashSet<String> = record.breached_emails.iter().map(|e| normalize(e)).collect();
        record.breached_emails = unique.into_iter().collect();
        record.breached_emails.sort_unstable();
        Ok(record)
    }
}

// =============================================================================
// MemoryStore - volatile backend
// =============================================================================

/// Volatile in-process store. Survives actor deactivation, not process restart.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<PartitionKey, Bytes>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records", &self.records.len())
            .finish()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    fn source_tag(&self) -> SourceTag {
        SourceTag::Memory
    }

    async fn load(&self, key: &PartitionKey) -> PartitionResult<Option<Bytes>> {
        Ok(self.records.get(key).map(|entry| entry.value().clone()))
    }

    async fn save(&self, key: &PartitionKey, payload: Bytes) -> PartitionResult<()> {
        self.records.insert(key.clone(), payload);
        Ok(())
    }
}

// =============================================================================
// ObjectStoreBackend - persistent backend
// =============================================================================

/// Persistent store writing one object per partition.
pub struct ObjectStoreBackend {
    object_store: Arc<dyn ObjectStore>,
    prefix: String,
    tag: SourceTag,
}

impl ObjectStoreBackend {
    pub fn new(object_store: Arc<dyn ObjectStore>, prefix: impl Into<String>, tag: SourceTag) -> Self {
        Self {
            object_store,
            prefix: prefix.into(),
            tag,
        }
    }

    /// Backend over `object_store::memory::InMemory`, for tests and ephemeral runs.
    pub fn in_memory(prefix: impl Into<String>) -> Self {
        Self::new(
            Arc::new(object_store::memory::InMemory::new()),
            prefix,
            SourceTag::ObjectMemory,
        )
    }

    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.object_store
    }
}

impl fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreBackend")
            .field("store", &self.object_store.to_string())
            .field("prefix", &self.prefix)
            .field("tag", &self.tag)
            .finish()
    }
}

#[async_trait]
impl DurableStore for ObjectStoreBackend {
    fn source_tag(&self) -> SourceTag {
        self.tag
    }

    async fn load(&self, key: &PartitionKey) -> PartitionResult<Option<Bytes>> {
        let location = keys::record_path(&self.prefix, key);
        match self.object_store.get(&location).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => {
                debug!(partition = %key, path = %location, "No checkpoint record");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &PartitionKey, payload: Bytes) -> PartitionResult<()> {
        let location = keys::record_path(&self.prefix, key);
        self.object_store
            .put(&location, PutPayload::from(payload))
            .await?;
        Ok(())
    }
}

/// Build the durable store selected by `config.store`.
pub fn build_store(config: &PartitionConfig) -> PartitionResult<Arc<dyn DurableStore>> {
    match &config.store {
        StoreType::Memory => Ok(Arc::new(MemoryStore::new())),
        other => {
            let (object_store, tag) = super::object_store::create_object_store(other)?;
            Ok(Arc::new(ObjectStoreBackend::new(
                object_store,
                config.store_prefix.clone(),
                tag,
            )))
        }
    }
}
