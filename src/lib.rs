//! # Breachcache
//! Partitioned breached-email lookup service.
//!
//! Addresses are routed by a SHA-256 digest of their domain to a partition.
//! Each partition is served by exactly one in-process actor that owns the
//! partition's set of known breached addresses, serializes every check and
//! add against it, and writes the set back to a durable store on a timer.
//! Idle actors are evicted and rehydrate from the store on next use.
//!
//! # Goals
//! - Single writer per partition without a global lock
//! - Request latency independent of the durable store
//! - Pluggable storage: in-memory, local filesystem, S3, GCS or Azure via [`object_store`](https://docs.rs/object_store)
//!
//! ## Durability
//! Adds are acknowledged from memory and flushed every checkpoint interval
//! (60s by default) and on deactivation. A crash loses at most one interval
//! of acknowledged adds.
//!
//! ## Getting started
//!
//! ```rust,no_run
//! use breachcache::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let service = BreachService::from_config(PartitionConfig::default()).await?;
//!
//!     assert!(service.add("someone@example.com").await?.is_created());
//!     assert!(service.check("SOMEONE@example.com").await?.is_found());
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! The `breachcache-server` binary wraps the service in an HTTP API; see
//! [`server`] for the endpoints.

#![forbid(unsafe_code)]

pub mod constants;
pub mod email;
pub mod error;
pub mod partition;
pub mod server;
pub mod service;
pub mod telemetry;
pub mod types;

pub mod prelude {
    //! Common imports.
    pub use crate::error::{Error, Result};
    pub use crate::partition::{
        ActorRegistry, DurableStore, MemoryStore, ObjectStoreBackend, PartitionConfig,
        PartitionError, StoreType, build_store,
    };
    pub use crate::server::{HttpServer, ServerConfig};
    pub use crate::service::BreachService;
    pub use crate::types::{AddOutcome, CheckOutcome, CheckResult, PartitionKey, SourceTag};
}
