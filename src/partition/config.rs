//! Configuration for partition actors and their durable store.
//!
//! ```rust,no_run
//! use breachcache::partition::PartitionConfig;
//!
//! let config = PartitionConfig::from_env().expect("invalid environment");
//! if let Err(errors) = config.validate() {
//!     for e in errors {
//!         eprintln!("config error: {e}");
//!     }
//! }
//! ```

use std::time::Duration;

use crate::constants::{
    DEFAULT_ACTIVATION_TIMEOUT_MS, DEFAULT_CHECKPOINT_INTERVAL_MS, DEFAULT_DATA_PATH,
    DEFAULT_DEACTIVATION_GRACE_MS, DEFAULT_IDLE_CHECK_INTERVAL_SECS, DEFAULT_IDLE_TIMEOUT_SECS,
    DEFAULT_MAX_ACTIVE_PARTITIONS, DEFAULT_STORE_PREFIX, DEFAULT_STORE_TIMEOUT_MS,
};

/// Durable store backend, selected once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StoreType {
    /// Volatile process memory. Everything is lost on restart.
    #[default]
    Memory,
    /// Local filesystem storage.
    Local {
        /// Path on local filesystem.
        path: String,
    },
    /// Amazon S3 or S3-compatible storage (MinIO, etc.).
    S3 {
        /// S3 bucket name.
        bucket: String,
        /// AWS region (e.g., "us-east-1").
        region: String,
        /// Optional custom endpoint for S3-compatible services.
        endpoint: Option<String>,
        /// Optional access key ID (if not using environment/IAM).
        access_key_id: Option<String>,
        /// Optional secret access key.
        secret_access_key: Option<String>,
    },
    /// Google Cloud Storage.
    Gcs {
        /// GCS bucket name.
        bucket: String,
        /// Optional path to service account key file.
        service_account_key: Option<String>,
    },
    /// Azure Blob Storage.
    Azure {
        /// Azure container name.
        container: String,
        /// Azure storage account name.
        account: String,
        /// Optional access key (if not using environment/managed identity).
        access_key: Option<String>,
    },
}

impl StoreType {
    pub fn name(&self) -> &'static str {
        match self {
            StoreType::Memory => "memory",
            StoreType::Local { .. } => "local",
            StoreType::S3 { .. } => "s3",
            StoreType::Gcs { .. } => "gcs",
            StoreType::Azure { .. } => "azure",
        }
    }
}

/// Configuration for partition actors, the registry and the durable store.
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Period of the per-actor checkpoint timer.
    pub checkpoint_interval: Duration,

    /// Bound for a single store load or save.
    pub store_timeout: Duration,

    /// Bound for the whole rehydration step of an activation (retries included).
    pub activation_timeout: Duration,

    /// Upper bound on deactivation: stopping the timer plus the final flush.
    pub deactivation_grace: Duration,

    /// Actors idle for longer than this are deactivated.
    pub idle_timeout: Duration,

    /// How often the registry looks for idle actors.
    pub idle_check_interval: Duration,

    /// Upper bound on resident actors. Least recently used ones are evicted beyond it.
    pub max_active_partitions: usize,

    /// Backend selection.
    pub store: StoreType,

    /// Object-store prefix for checkpoint records.
    pub store_prefix: String,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: Duration::from_millis(DEFAULT_CHECKPOINT_INTERVAL_MS),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            activation_timeout: Duration::from_millis(DEFAULT_ACTIVATION_TIMEOUT_MS),
            deactivation_grace: Duration::from_millis(DEFAULT_DEACTIVATION_GRACE_MS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            idle_check_interval: Duration::from_secs(DEFAULT_IDLE_CHECK_INTERVAL_SECS),
            max_active_partitions: DEFAULT_MAX_ACTIVE_PARTITIONS,
            store: StoreType::default(),
            store_prefix: DEFAULT_STORE_PREFIX.to_string(),
        }
    }
}

impl PartitionConfig {
    /// Validate the configuration and return any errors found.
    ///
    /// This should be called at startup to catch configuration issues early.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("checkpoint_interval", self.checkpoint_interval),
            ("store_timeout", self.store_timeout),
            ("activation_timeout", self.activation_timeout),
            ("deactivation_grace", self.deactivation_grace),
            ("idle_timeout", self.idle_timeout),
            ("idle_check_interval", self.idle_check_interval),
        ] {
            if value.is_zero() {
                errors.push(format!("{} must be greater than zero", name));
            }
        }

        // A save must be abandoned before the next tick would start another one
        if self.store_timeout >= self.checkpoint_interval {
            errors.push(format!(
                "store_timeout ({:?}) must be less than checkpoint_interval ({:?})",
                self.store_timeout, self.checkpoint_interval
            ));
        }

        if self.idle_check_interval > self.idle_timeout {
            errors.push(format!(
                "idle_check_interval ({:?}) must not exceed idle_timeout ({:?})",
                self.idle_check_interval, self.idle_timeout
            ));
        }

        if self.max_active_partitions == 0 {
            errors.push("max_active_partitions must be greater than zero".to_string());
        }

        match &self.store {
            StoreType::Memory => {}
            StoreType::Local { path } if path.trim().is_empty() => {
                errors.push("local store path must not be empty".to_string());
            }
            StoreType::S3 { bucket, .. } if bucket.trim().is_empty() => {
                errors.push("S3 bucket must not be empty".to_string());
            }
            StoreType::Gcs { bucket, .. } if bucket.trim().is_empty() => {
                errors.push("GCS bucket must not be empty".to_string());
            }
            StoreType::Azure {
                container, account, ..
            } if container.trim().is_empty() || account.trim().is_empty() => {
                errors.push("Azure container and account must not be empty".to_string());
            }
            _ => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Timing:
    /// - `CHECKPOINT_INTERVAL_MS`, `STORE_TIMEOUT_MS`, `ACTIVATION_TIMEOUT_MS`,
    ///   `DEACTIVATION_GRACE_MS`
    /// - `IDLE_TIMEOUT_SECS`, `IDLE_CHECK_INTERVAL_SECS`
    /// - `MAX_ACTIVE_PARTITIONS`
    ///
    /// Store selection via `STORE_TYPE` (`memory`, `local`, `s3`, `gcs`, `azure`):
    /// - local: `DATA_PATH`
    /// - s3: `S3_BUCKET`/`AWS_S3_BUCKET`, `AWS_REGION`, `AWS_ENDPOINT`,
    ///   `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`
    /// - gcs: `GCS_BUCKET`, `GOOGLE_APPLICATION_CREDENTIALS`
    /// - azure: `AZURE_CONTAINER`, `AZURE_STORAGE_ACCOUNT`, `AZURE_STORAGE_ACCESS_KEY`
    ///
    /// `STORE_PREFIX` sets the object-store prefix.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = Self::default();

        let checkpoint_interval = env_millis("CHECKPOINT_INTERVAL_MS")?
            .unwrap_or(defaults.checkpoint_interval);
        let store_timeout = env_millis("STORE_TIMEOUT_MS")?.unwrap_or(defaults.store_timeout);
        let activation_timeout =
            env_millis("ACTIVATION_TIMEOUT_MS")?.unwrap_or(defaults.activation_timeout);
        let deactivation_grace =
            env_millis("DEACTIVATION_GRACE_MS")?.unwrap_or(defaults.deactivation_grace);

        let idle_timeout = env_parse::<u64>("IDLE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.idle_timeout);
        let idle_check_interval = env_parse::<u64>("IDLE_CHECK_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.idle_check_interval);

        let max_active_partitions = env_parse::<usize>("MAX_ACTIVE_PARTITIONS")?
            .unwrap_or(defaults.max_active_partitions);

        let store_prefix =
            std::env::var("STORE_PREFIX").unwrap_or_else(|_| defaults.store_prefix.clone());

        let store_type = std::env::var("STORE_TYPE")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase();

        let store = match store_type.as_str() {
            "memory" => StoreType::Memory,
            "local" => StoreType::Local {
                path: std::env::var("DATA_PATH").unwrap_or_else(|_| DEFAULT_DATA_PATH.to_string()),
            },
            "s3" => {
                let bucket = std::env::var("AWS_S3_BUCKET")
                    .or_else(|_| std::env::var("S3_BUCKET"))
                    .map_err(|_| "S3_BUCKET or AWS_S3_BUCKET must be set when STORE_TYPE=s3")?;

                let region = std::env::var("AWS_REGION")
                    .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
                    .unwrap_or_else(|_| "us-east-1".to_string());

                let endpoint = std::env::var("AWS_ENDPOINT")
                    .or_else(|_| std::env::var("S3_ENDPOINT"))
                    .ok();

                StoreType::S3 {
                    bucket,
                    region,
                    endpoint,
                    access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
                    secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
                }
            }
            "gcs" => StoreType::Gcs {
                bucket: std::env::var("GCS_BUCKET")
                    .map_err(|_| "GCS_BUCKET must be set when STORE_TYPE=gcs")?,
                service_account_key: std::env::var("GOOGLE_APPLICATION_CREDENTIALS").ok(),
            },
            "azure" => StoreType::Azure {
                container: std::env::var("AZURE_CONTAINER")
                    .map_err(|_| "AZURE_CONTAINER must be set")?,
                account: std::env::var("AZURE_STORAGE_ACCOUNT")
                    .map_err(|_| "AZURE_STORAGE_ACCOUNT must be set")?,
                access_key: std::env::var("AZURE_STORAGE_ACCESS_KEY").ok(),
            },
            other => {
                return Err(format!(
                    "Unknown STORE_TYPE '{}'. Valid types: memory, local, s3, gcs, azure",
                    other
                )
                .into());
            }
        };

        Ok(Self {
            checkpoint_interval,
            store_timeout,
            activation_timeout,
            deactivation_grace,
            idle_timeout,
            idle_check_interval,
            max_active_partitions,
            store,
            store_prefix,
        })
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("Invalid {}: {}", name, e)),
        Err(_) => Ok(None),
    }
}

fn env_millis(name: &str) -> Result<Option<Duration>, String> {
    Ok(env_parse::<u64>(name)?.map(Duration::from_millis))
}
