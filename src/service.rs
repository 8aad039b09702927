//! Breach lookup service: email in, partition operation out.
//!
//! Validates the address, routes it to its partition by domain and runs the
//! operation through the [`ActorRegistry`]. This is the only entry point the
//! HTTP server uses.

use std::sync::Arc;

use tracing::debug;

use crate::email;
use crate::error::{Error, Result};
use crate::partition::metrics::record_operation;
use crate::partition::{ActorRegistry, PartitionConfig, PartitionError, build_store};
use crate::types::{AddOutcome, CheckOutcome};

#[derive(Debug, Clone)]
pub struct BreachService {
    registry: Arc<ActorRegistry>,
}

impl BreachService {
    pub fn new(registry: Arc<ActorRegistry>) -> Self {
        Self { registry }
    }

    /// Validate `config`, build its durable store and start a registry on it.
    pub async fn from_config(config: PartitionConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| Error::Config(errors.join("; ")))?;
        let store = build_store(&config)?;
        let registry = ActorRegistry::new(config, store);
        registry.start().await;
        Ok(Self::new(registry))
    }

    pub fn registry(&self) -> &Arc<ActorRegistry> {
        &self.registry
    }

    /// Is `email` a known breached address?
    pub async fn check(&self, email: &str) -> Result<CheckOutcome> {
        let normalized = email::normalize(email);
        let key = email::route(&normalized)?;

        match self.registry.check(&key, &normalized).await {
            Ok(result) => {
                let outcome = CheckOutcome::from(result);
                record_operation("check", if outcome.is_found() { "found" } else { "not_found" });
                debug!(partition = %key, found = outcome.is_found(), "Check served");
                Ok(outcome)
            }
            Err(e) => Err(self.failed("check", e)),
        }
    }

    /// Record `email` as breached.
    pub async fn add(&self, email: &str) -> Result<AddOutcome> {
        let normalized = email::normalize(email);
        let key = email::route(&normalized)?;

        match self.registry.add(&key, &normalized).await {
            Ok(added) => {
                record_operation("add", if added { "created" } else { "conflict" });
                debug!(partition = %key, added, "Add served");
                Ok(AddOutcome::from_added(added, normalized))
            }
            Err(e) => Err(self.failed("add", e)),
        }
    }

    fn failed(&self, op: &str, e: PartitionError) -> Error {
        record_operation(op, e.as_metric_label());
        e.into()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.registry.is_shutting_down()
    }

    /// Deactivate every partition, flushing dirty state.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}
