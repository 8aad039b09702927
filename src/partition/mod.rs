//! Partition actors with write-back checkpointing.
//!
//! Breached emails are partitioned by a digest of their domain. Each
//! partition is served by exactly one [`PartitionActor`] at a time, which
//! owns the partition's in-memory set and flushes it to a [`DurableStore`]
//! in the background.
//!
//! # Architecture
//!
//! ```text
//!          check / add
//!               │
//!               ▼
//!      ┌─────────────────┐   resolve(key)   ┌──────────────────┐
//!      │  ActorRegistry  │ ───────────────> │  PartitionActor  │ one per key
//!      │ DashMap+OnceCell│                  │ Mutex<State>     │
//!      └────────┬────────┘                  └────────┬─────────┘
//!               │ idle sweep                         │ CheckpointScheduler
//!               ▼                                    ▼
//!        deactivate: flush,                  ┌──────────────────┐
//!        unregister, inactive                │   DurableStore   │ memory / object_store
//!                                            └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use breachcache::partition::{ActorRegistry, PartitionConfig, build_store};
//! use breachcache::types::PartitionKey;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PartitionConfig::from_env()?;
//!     let store = build_store(&config)?;
//!     let registry = ActorRegistry::new(config, store);
//!     registry.start().await;
//!
//!     let key = PartitionKey::from("example-key");
//!     registry.add(&key, "user@example.com").await?;
//!     assert!(registry.check(&key, "USER@example.com").await?.is_pwned);
//!
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```

mod actor;
pub mod checkpoint;
mod config;
mod error;
pub mod keys;
pub mod metrics;
mod object_store;
mod registry;
pub mod retry;
mod state;
mod store;

pub use actor::{ActorStats, ActorStatus, CheckpointOutcome, DeactivationReason, PartitionActor};
pub use checkpoint::{CheckpointScheduler, CheckpointTarget};
pub use config::{PartitionConfig, StoreType};
pub use error::{PartitionError, PartitionResult};
pub use self::object_store::create_object_store;
pub use registry::ActorRegistry;
pub use state::{PartitionState, StateSnapshot};
pub use store::{CheckpointRecord, DurableStore, MemoryStore, ObjectStoreBackend, build_store};
