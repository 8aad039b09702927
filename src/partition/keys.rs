//! Object-store path layout for checkpoint records.
//!
//! # Layout (v1)
//!
//! Each partition owns exactly one object:
//!
//! ```text
//! {prefix}/{partition_key}.json
//! ```
//!
//! The record is replaced wholesale on every checkpoint; no history is kept.
//! Partition keys are hex digests, so they are always valid path segments.

use object_store::path::Path as ObjectPath;

use crate::types::PartitionKey;

/// File extension of checkpoint records.
pub const RECORD_EXTENSION: &str = "json";

/// Build the object path of a partition's checkpoint record.
pub fn record_path(prefix: &str, key: &PartitionKey) -> ObjectPath {
    let file = format!("{}.{}", key.as_str(), RECORD_EXTENSION);
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        ObjectPath::from(file)
    } else {
        ObjectPath::from(format!("{}/{}", prefix, file))
    }
}
