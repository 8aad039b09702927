//! Shared value types.
//!
//! [`PartitionKey`] is the routing identity of a partition actor. The result
//! types ([`CheckResult`], [`CheckOutcome`], [`AddOutcome`]) are what the
//! actor and the service hand back to callers.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Routing key of a partition actor.
///
/// Opaque string derived from an email domain (see [`crate::email`]). Wraps
/// `Arc<str>` so clones on the hot path (registry lookups, log fields, store
/// keys) are O(1).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey(Arc<str>);

impl PartitionKey {
    #[inline]
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionKey({})", self.0)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for PartitionKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

impl AsRef<str> for PartitionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Which durable backend serves a partition.
///
/// Diagnostic only; reported in every [`CheckResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceTag {
    /// Process-local volatile store.
    Memory,
    /// Object store kept in process memory (tests, ephemeral deployments).
    ObjectMemory,
    /// Local filesystem object store.
    Local,
    /// Amazon S3 or an S3-compatible service.
    S3,
    /// Google Cloud Storage.
    Gcs,
    /// Azure Blob Storage.
    AzureBlob,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Memory => "memory",
            SourceTag::ObjectMemory => "object-memory",
            SourceTag::Local => "local",
            SourceTag::S3 => "s3",
            SourceTag::Gcs => "gcs",
            SourceTag::AzureBlob => "azure-blob",
        }
    }

    /// Returns true if the backend survives a process restart.
    pub fn is_persistent(&self) -> bool {
        !matches!(self, SourceTag::Memory | SourceTag::ObjectMemory)
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a membership check against one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub is_pwned: bool,
    /// 1 when present, 0 otherwise. The corpus records presence, not multiplicity.
    pub breach_count: u32,
    #[serde(rename = "checkedAtUtc")]
    pub observed_at: DateTime<Utc>,
    pub source: SourceTag,
}

impl CheckResult {
    pub fn new(is_pwned: bool, source: SourceTag) -> Self {
        Self {
            is_pwned,
            breach_count: u32::from(is_pwned),
            observed_at: Utc::now(),
            source,
        }
    }
}

/// Outcome of a check, shaped for the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Found(CheckResult),
    NotFound(CheckResult),
}

impl CheckOutcome {
    pub fn result(&self) -> &CheckResult {
        match self {
            CheckOutcome::Found(r) | CheckOutcome::NotFound(r) => r,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, CheckOutcome::Found(_))
    }
}

impl From<CheckResult> for CheckOutcome {
    fn from(result: CheckResult) -> Self {
        if result.is_pwned {
            CheckOutcome::Found(result)
        } else {
            CheckOutcome::NotFound(result)
        }
    }
}

/// Outcome of an add, shaped for the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The email was not known and is now recorded.
    Created(String),
    /// The email was already recorded.
    Conflict(String),
}

impl AddOutcome {
    pub fn from_added(added: bool, email: String) -> Self {
        if added {
            AddOutcome::Created(email)
        } else {
            AddOutcome::Conflict(email)
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, AddOutcome::Created(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partition_key_display_and_debug() {
        let key = PartitionKey::from("abc123");
        assert_eq!(key.to_string(), "abc123");
        assert_eq!(format!("{:?}", key), "PartitionKey(abc123)");
    }

    #[test]
    fn test_partition_key_hash_eq() {
        let mut map = HashMap::new();
        map.insert(PartitionKey::from("a"), 1);
        map.insert(PartitionKey::from(String::from("b")), 2);
        assert_eq!(map.get(&PartitionKey::from("a")), Some(&1));
        assert_eq!(map.get(&PartitionKey::from("b")), Some(&2));
        assert_eq!(map.get(&PartitionKey::from("c")), None);
    }

    #[test]
    fn test_source_tag_labels() {
        assert_eq!(SourceTag::Memory.as_str(), "memory");
        assert_eq!(SourceTag::AzureBlob.to_string(), "azure-blob");
        assert!(!SourceTag::Memory.is_persistent());
        assert!(!SourceTag::ObjectMemory.is_persistent());
        assert!(SourceTag::S3.is_persistent());
    }

    #[test]
    fn test_check_result_breach_count() {
        assert_eq!(CheckResult::new(true, SourceTag::Memory).breach_count, 1);
        assert_eq!(CheckResult::new(false, SourceTag::Memory).breach_count, 0);
    }

    #[test]
    fn test_check_result_json_shape() {
        let result = CheckResult::new(true, SourceTag::AzureBlob);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isPwned"], true);
        assert_eq!(json["breachCount"], 1);
        assert_eq!(json["source"], "azure-blob");
        assert!(json.get("checkedAtUtc").is_some());
    }

    #[test]
    fn test_outcome_mapping() {
        let found: CheckOutcome = CheckResult::new(true, SourceTag::Memory).into();
        let missing: CheckOutcome = CheckResult::new(false, SourceTag::Memory).into();
        assert!(found.is_found());
        assert!(!missing.is_found());
        assert!(!missing.result().is_pwned);

        assert!(AddOutcome::from_added(true, "a@b.c".into()).is_created());
        assert!(!AddOutcome::from_added(false, "a@b.c".into()).is_created());
    }
}
