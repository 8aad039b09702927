//! Object store creation and configuration.
//!
//! Builds the `object_store` client behind the persistent durable store for
//! each supported backend: Local, S3, GCS and Azure.

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use std::sync::Arc;
use tracing::info;

use super::config::StoreType;
use super::error::{PartitionError, PartitionResult};
use crate::types::SourceTag;

/// Create an object store for a persistent backend.
///
/// Returns the client together with the [`SourceTag`] reported by checks
/// served from it.
///
/// # Errors
///
/// Returns an error if:
/// - `store` is [`StoreType::Memory`], which has no object store
/// - The data directory cannot be created (for local filesystem)
/// - Cloud provider configuration is invalid
pub fn create_object_store(store: &StoreType) -> PartitionResult<(Arc<dyn ObjectStore>, SourceTag)> {
    match store {
        StoreType::Memory => Err(PartitionError::Config(
            "memory store is not backed by an object store".to_string(),
        )),
        StoreType::Local { path } => {
            std::fs::create_dir_all(path).map_err(|e| {
                PartitionError::Config(format!("Failed to create data directory: {}", e))
            })?;

            let store = LocalFileSystem::new_with_prefix(path)?;
            info!(path = %path, "Using local filesystem object store");
            Ok((Arc::new(store), SourceTag::Local))
        }
        StoreType::S3 {
            bucket,
            region,
            endpoint,
            access_key_id,
            secret_access_key,
        } => {
            use object_store::aws::AmazonS3Builder;

            let mut builder = AmazonS3Builder::new()
                .with_bucket_name(bucket)
                .with_region(region);

            if let Some(ep) = endpoint {
                builder = builder.with_endpoint(ep).with_allow_http(true);
            }

            if let (Some(key), Some(secret)) = (access_key_id, secret_access_key) {
                builder = builder
                    .with_access_key_id(key)
                    .with_secret_access_key(secret);
            }

            let store = builder.build().map_err(|e| {
                PartitionError::Config(format!("Failed to create S3 object store: {}", e))
            })?;

            info!(bucket = %bucket, region = %region, "Using S3 object store");
            Ok((Arc::new(store), SourceTag::S3))
        }
        StoreType::Gcs {
            bucket,
            service_account_key,
        } => {
            use object_store::gcp::GoogleCloudStorageBuilder;

            let mut builder = GoogleCloudStorageBuilder::new().with_bucket_name(bucket);

            if let Some(key_path) = service_account_key {
                builder = builder.with_service_account_path(key_path);
            }

            let store = builder.build().map_err(|e| {
                PartitionError::Config(format!("Failed to create GCS object store: {}", e))
            })?;

            info!(bucket = %bucket, "Using GCS object store");
            Ok((Arc::new(store), SourceTag::Gcs))
        }
        StoreType::Azure {
            container,
            account,
            access_key,
        } => {
            use object_store::azure::MicrosoftAzureBuilder;

            let mut builder = MicrosoftAzureBuilder::new()
                .with_container_name(container)
                .with_account(account);

            if let Some(key) = access_key {
                builder = builder.with_access_key(key);
            }

            let store = builder.build().map_err(|e| {
                PartitionError::Config(format!("Failed to create Azure object store: {}", e))
            })?;

            info!(container = %container, account = %account, "Using Azure object store");
            Ok((Arc::new(store), SourceTag::AzureBlob))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::PutPayload;
    use object_store::path::Path as ObjectPath;
    use tempfile::TempDir;

    #[test]
    fn test_memory_type_has_no_object_store() {
        let result = create_object_store(&StoreType::Memory);
        assert!(matches!(result, Err(PartitionError::Config(_))));
    }

    #[test]
    fn test_create_local_object_store_nested_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a").join("b").join("data");

        let (_, tag) = create_object_store(&StoreType::Local {
            path: path.to_string_lossy().to_string(),
        })
        .unwrap();

        assert_eq!(tag, SourceTag::Local);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_local_object_store_is_usable() {
        let temp_dir = TempDir::new().unwrap();
        let (store, _) = create_object_store(&StoreType::Local {
            path: temp_dir.path().to_string_lossy().to_string(),
        })
        .unwrap();

        let location = ObjectPath::from("partitions/abc.json");
        store
            .put(&location, PutPayload::from_static(b"{}"))
            .await
            .unwrap();
        let bytes = store.get(&location).await.unwrap().bytes().await.unwrap();
        assert_eq!(bytes.as_ref(), b"{}");
    }

    #[test]
    fn test_s3_store_with_explicit_credentials() {
        let result = create_object_store(&StoreType::S3 {
            bucket: "breaches".to_string(),
            region: "us-east-1".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
            access_key_id: Some("minioadmin".to_string()),
            secret_access_key: Some("minioadmin".to_string()),
        });
        let (_, tag) = result.unwrap();
        assert_eq!(tag, SourceTag::S3);
    }

    #[test]
    fn test_azure_store_with_access_key() {
        let result = create_object_store(&StoreType::Azure {
            container: "breaches".to_string(),
            account: "devstoreaccount1".to_string(),
            access_key: Some(
                "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw=="
                    .to_string(),
            ),
        });
        let (_, tag) = result.unwrap();
        assert_eq!(tag, SourceTag::AzureBlob);
    }
}
