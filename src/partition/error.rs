//! Error types for the partition actor subsystem.
//!
//! # Error Handling Patterns
//!
//! Two patterns are used depending on where the failure happens:
//!
//! ## Fail-Fast (Propagate Errors)
//!
//! - Rehydration during activation: the caller sees a transient failure and
//!   the actor never becomes active with partial state.
//! - Operations against an actor that is deactivating: the caller re-routes.
//!
//! ## Best-Effort (Log and Continue)
//!
//! - Periodic checkpoints: a failed or timed-out flush is logged and counted,
//!   the state stays dirty and the next tick retries.
//! - Final flush on deactivation: bounded by a grace period, then the actor
//!   deactivates anyway.

use std::time::Duration;

use thiserror::Error;

use crate::types::PartitionKey;

/// Result type for partition operations.
pub type PartitionResult<T> = Result<T, PartitionError>;

/// Errors raised by partition actors, the registry and durable stores.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// Error from object store operations.
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Generic storage error raised by a durable store implementation.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The durable store could not be read while activating a partition.
    #[error("Failed to rehydrate partition {key}: {message}")]
    Rehydration { key: PartitionKey, message: String },

    /// A checkpoint write failed. The state stays dirty.
    #[error("Checkpoint failed for partition {key}: {message}")]
    CheckpointFailed { key: PartitionKey, message: String },

    /// A bounded store operation did not complete in time.
    #[error("{operation} timed out for partition {key} after {timeout:?}")]
    Timeout {
        operation: &'static str,
        key: PartitionKey,
        timeout: Duration,
    },

    /// The stored record could not be interpreted for this partition.
    #[error("Corrupt checkpoint record for partition {key}: {message}")]
    CorruptRecord { key: PartitionKey, message: String },

    /// The actor is deactivating; the operation must be routed to a fresh activation.
    #[error("Partition {key} is deactivating")]
    Deactivating { key: PartitionKey },

    /// The registry is shutting down and accepts no new work.
    #[error("Partition registry is shutting down")]
    ShuttingDown,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PartitionError {
    /// Check if this error is retriable (transient infrastructure issue).
    ///
    /// Object store errors are classified by kind; rehydration and checkpoint
    /// failures inherit retriability since they wrap store I/O.
    #[inline]
    pub fn is_retriable(&self) -> bool {
        match self {
            PartitionError::ObjectStore(e) => Self::is_object_store_error_retryable(e),
            PartitionError::Storage(_) => true,
            PartitionError::Rehydration { .. } => true,
            PartitionError::CheckpointFailed { .. } => true,
            PartitionError::Timeout { .. } => true,
            PartitionError::Deactivating { .. } => true,

            PartitionError::Serde(_) => false,
            PartitionError::CorruptRecord { .. } => false,
            PartitionError::ShuttingDown => false,
            PartitionError::Config(_) => false,
        }
    }

    /// Returns true if the caller should see this as a temporary outage.
    pub fn is_transient(&self) -> bool {
        self.is_retriable() || matches!(self, PartitionError::ShuttingDown)
    }

    /// Classify object_store errors as retryable or permanent.
    fn is_object_store_error_retryable(e: &object_store::Error) -> bool {
        use object_store::Error as ObjErr;

        match e {
            ObjErr::NotFound { .. } => false,
            ObjErr::AlreadyExists { .. } => false,
            ObjErr::Precondition { .. } => false,
            ObjErr::NotSupported { .. } => false,
            ObjErr::InvalidPath { .. } => false,
            ObjErr::JoinError { .. } => false,
            ObjErr::NotImplemented => false,
            ObjErr::PermissionDenied { .. } => false,
            ObjErr::Unauthenticated { .. } => false,
            ObjErr::UnknownConfigurationKey { .. } => false,

            ObjErr::NotModified { .. } => true,

            ObjErr::Generic { source, .. } => {
                let msg = source.to_string().to_lowercase();
                msg.contains("timeout")
                    || msg.contains("connection")
                    || msg.contains("throttl")
                    || msg.contains("rate limit")
                    || msg.contains("temporary")
                    || msg.contains("unavailable")
                    || msg.contains("503")
                    || msg.contains("500")
                    || msg.contains("429")
            }

            #[allow(unreachable_patterns)]
            _ => true,
        }
    }

    /// Check if this is a permission/authentication error.
    pub fn is_permission_error(&self) -> bool {
        matches!(
            self,
            PartitionError::ObjectStore(
                object_store::Error::PermissionDenied { .. }
                    | object_store::Error::Unauthenticated { .. }
            )
        )
    }

    /// Label used in metrics.
    pub fn as_metric_label(&self) -> &'static str {
        match self {
            PartitionError::ObjectStore(_) => "object_store",
            PartitionError::Serde(_) => "serde",
            PartitionError::Storage(_) => "storage",
            PartitionError::Rehydration { .. } => "rehydration",
            PartitionError::CheckpointFailed { .. } => "checkpoint",
            PartitionError::Timeout { .. } => "timeout",
            PartitionError::CorruptRecord { .. } => "corrupt",
            PartitionError::Deactivating { .. } => "deactivating",
            PartitionError::ShuttingDown => "shutting_down",
            PartitionError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PartitionKey {
        PartitionKey::from("k1")
    }

    #[test]
    fn test_display_messages() {
        let err = PartitionError::Rehydration {
            key: key(),
            message: "store unreachable".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to rehydrate partition k1: store unreachable"
        );

        let err = PartitionError::Timeout {
            operation: "checkpoint",
            key: key(),
            timeout: Duration::from_millis(50),
        };
        assert!(err.to_string().contains("checkpoint timed out for partition k1"));

        assert_eq!(
            PartitionError::Deactivating { key: key() }.to_string(),
            "Partition k1 is deactivating"
        );
    }

    #[test]
    fn test_retriable_classification() {
        assert!(PartitionError::Storage("x".into()).is_retriable());
        assert!(PartitionError::Deactivating { key: key() }.is_retriable());
        assert!(
            PartitionError::Timeout {
                operation: "load",
                key: key(),
                timeout: Duration::from_secs(1)
            }
            .is_retriable()
        );
        assert!(!PartitionError::Config("bad".into()).is_retriable());
        assert!(!PartitionError::ShuttingDown.is_retriable());
        assert!(PartitionError::ShuttingDown.is_transient());
        assert!(
            !PartitionError::CorruptRecord {
                key: key(),
                message: "x".into()
            }
            .is_retriable()
        );
    }

    #[test]
    fn test_object_store_classification() {
        let not_found = PartitionError::ObjectStore(object_store::Error::NotFound {
            path: "p".into(),
            source: "missing".into(),
        });
        assert!(!not_found.is_retriable());

        let generic = PartitionError::ObjectStore(object_store::Error::Generic {
            store: "S3",
            source: "connection reset by peer".into(),
        });
        assert!(generic.is_retriable());

        let denied = PartitionError::ObjectStore(object_store::Error::PermissionDenied {
            path: "p".into(),
            source: "nope".into(),
        });
        assert!(!denied.is_retriable());
        assert!(denied.is_permission_error());
    }

    #[test]
    fn test_serde_error_conversion() {
        let json_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err: PartitionError = json_err.into();
        assert!(matches!(err, PartitionError::Serde(_)));
        assert!(!err.is_retriable());
        assert_eq!(err.as_metric_label(), "serde");
    }
}
