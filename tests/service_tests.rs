//! End-to-end service tests over a persistent local-filesystem store.
//!
//! Covers the restart story: adds acknowledged before a clean shutdown are
//! visible to a new process over the same directory, and a corrupt record
//! fails activation instead of silently starting empty.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test service_tests
//! ```

use std::time::Duration;

use tempfile::TempDir;

use breachcache::email;
use breachcache::error::Error;
use breachcache::partition::{PartitionConfig, PartitionError, StoreType};
use breachcache::service::BreachService;
use breachcache::types::SourceTag;

fn local_config(dir: &TempDir) -> PartitionConfig {
    PartitionConfig {
        store: StoreType::Local {
            path: dir.path().to_string_lossy().into_owned(),
        },
        store_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

// ============================================================================
// Restart
// ============================================================================

#[tokio::test]
async fn test_adds_survive_restart() {
    let dir = TempDir::new().unwrap();

    let service = BreachService::from_config(local_config(&dir)).await.unwrap();
    assert!(service.add("alice@example.com").await.unwrap().is_created());
    assert!(service.add("bob@other.org").await.unwrap().is_created());
    service.shutdown().await;

    let restarted = BreachService::from_config(local_config(&dir)).await.unwrap();
    let alice = restarted.check("ALICE@example.com").await.unwrap();
    assert!(alice.is_found());
    assert_eq!(alice.result().source, SourceTag::Local);
    assert!(restarted.check("bob@other.org").await.unwrap().is_found());
    assert!(!restarted.check("carol@example.com").await.unwrap().is_found());
    assert!(!restarted.add("alice@example.com").await.unwrap().is_created());
    restarted.shutdown().await;
}

#[tokio::test]
async fn test_record_written_under_prefix() {
    let dir = TempDir::new().unwrap();
    let config = local_config(&dir);
    let prefix = config.store_prefix.clone();

    let service = BreachService::from_config(config).await.unwrap();
    service.add("alice@example.com").await.unwrap();
    service.shutdown().await;

    let key = email::route("alice@example.com").unwrap();
    let path = dir.path().join(prefix).join(format!("{}.json", key));
    let contents = std::fs::read_to_string(path).unwrap();
    assert!(contents.contains("alice@example.com"));
}

// ============================================================================
// Corruption
// ============================================================================

#[tokio::test]
async fn test_corrupt_record_fails_activation() {
    let dir = TempDir::new().unwrap();
    let config = local_config(&dir);

    let key = email::route("alice@example.com").unwrap();
    let record_dir = dir.path().join(&config.store_prefix);
    std::fs::create_dir_all(&record_dir).unwrap();
    std::fs::write(record_dir.join(format!("{}.json", key)), b"{not json").unwrap();

    let service = BreachService::from_config(config).await.unwrap();
    let err = service.check("alice@example.com").await.unwrap_err();
    assert!(matches!(err, Error::Partition(PartitionError::Serde(_))));
    assert!(!err.is_transient());
    assert!(!service.registry().contains(&key));

    // Other partitions are unaffected.
    assert!(service.add("bob@other.org").await.unwrap().is_created());
    service.shutdown().await;
}

#[tokio::test]
async fn test_record_for_wrong_partition_rejected() {
    let dir = TempDir::new().unwrap();
    let config = local_config(&dir);

    let key = email::route("alice@example.com").unwrap();
    let record_dir = dir.path().join(&config.store_prefix);
    std::fs::create_dir_all(&record_dir).unwrap();
    let foreign = r#"{"partition_key":"someone-else","breached_emails":[],"saved_at":"2024-01-01T00:00:00Z"}"#;
    std::fs::write(record_dir.join(format!("{}.json", key)), foreign).unwrap();

    let service = BreachService::from_config(config).await.unwrap();
    let err = service.add("alice@example.com").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Partition(PartitionError::CorruptRecord { .. })
    ));
    service.shutdown().await;
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_invalid_emails_are_client_errors() {
    let service = BreachService::from_config(PartitionConfig::default())
        .await
        .unwrap();

    for bad in ["", "no-at-sign", "@example.com", "user@", "a@b@c"] {
        let err = service.check(bad).await.unwrap_err();
        assert!(err.is_client_error(), "{:?} should be rejected", bad);
    }
    assert!(service.registry().is_empty());
    service.shutdown().await;
}
