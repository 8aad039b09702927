//! Email validation and partition key derivation.
//!
//! Every address is routed by its domain: all addresses of one domain land on
//! the same partition actor. The key is a SHA-256 digest of the lowercased
//! domain, so routing is deterministic and the domain itself never appears in
//! storage paths.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::PartitionKey;

/// Reasons an address is rejected before it reaches a partition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidEmail {
    #[error("email address is empty")]
    Empty,

    #[error("email address has no '@'")]
    MissingAt,

    #[error("email address has more than one '@'")]
    MultipleAt,

    #[error("email address has an empty local part")]
    EmptyLocalPart,

    #[error("invalid domain '{0}'")]
    InvalidDomain(String),
}

/// Lowercase and trim an address. This is the canonical stored form.
pub fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate `email` and return its normalized domain.
///
/// Rules: exactly one `@`, non-empty local part, and a domain that contains at
/// least one interior `.`, does not start or end with `.`, and has no `..`.
pub fn derive_domain(email: &str) -> Result<String, InvalidEmail> {
    let email = email.trim();
    if email.is_empty() {
        return Err(InvalidEmail::Empty);
    }

    let mut parts = email.split('@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().ok_or(InvalidEmail::MissingAt)?;
    if parts.next().is_some() {
        return Err(InvalidEmail::MultipleAt);
    }

    if local.is_empty() {
        return Err(InvalidEmail::EmptyLocalPart);
    }

    let domain = domain.to_lowercase();
    let valid = !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
        && !domain.chars().any(char::is_whitespace);
    if !valid {
        return Err(InvalidEmail::InvalidDomain(domain));
    }

    Ok(domain)
}

/// Hash a domain into its partition key (lowercase hex SHA-256).
pub fn partition_key_for_domain(domain: &str) -> PartitionKey {
    let digest = Sha256::digest(domain.trim().to_lowercase().as_bytes());
    PartitionKey::new(format!("{:x}", digest))
}

/// Validate an address and compute its partition key in one step.
pub fn route(email: &str) -> Result<PartitionKey, InvalidEmail> {
    derive_domain(email).map(|domain| partition_key_for_domain(&domain))
}
