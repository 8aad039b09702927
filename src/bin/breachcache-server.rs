//! Breachcache HTTP server.
//!
//! ## Running
//!
//! In-memory store (state lives until the process exits):
//! ```bash
//! cargo run --bin breachcache-server
//! ```
//!
//! Local filesystem store with JSON logging:
//! ```bash
//! STORE_TYPE=local DATA_PATH=/var/lib/breachcache LOG_FORMAT=json cargo run --bin breachcache-server
//! ```
//!
//! S3 store (MinIO example):
//! ```bash
//! STORE_TYPE=s3 \
//! S3_BUCKET=breachcache \
//! AWS_ENDPOINT=http://localhost:9000 \
//! AWS_ACCESS_KEY_ID=minioadmin \
//! AWS_SECRET_ACCESS_KEY=minioadmin \
//! AWS_REGION=us-east-1 \
//! cargo run --bin breachcache-server
//! ```
//!
//! Then:
//! ```bash
//! curl -X POST localhost:8080/api/pwned/someone%40example.com
//! curl localhost:8080/api/pwned/someone%40example.com
//! ```
//!
//! On ctrl-c the listener stops first, then every partition flushes its
//! dirty state before the process exits.

use std::sync::Arc;

use breachcache::partition::PartitionConfig;
use breachcache::partition::metrics::init_metrics;
use breachcache::server::{HttpServer, ServerConfig};
use breachcache::service::BreachService;
use breachcache::telemetry::{LogFormat, init_logging};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LogFormat::from_env()).map_err(|e| -> Box<dyn std::error::Error> { e })?;
    init_metrics();

    let partition_config = PartitionConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;
    if let Err(errors) = server_config.validate() {
        for e in &errors {
            error!(error = %e, "Invalid server configuration");
        }
        return Err(errors.join("; ").into());
    }

    info!(
        listen_addr = %server_config.listen_addr,
        store = partition_config.store.name(),
        checkpoint_interval_ms = partition_config.checkpoint_interval.as_millis() as u64,
        idle_timeout_secs = partition_config.idle_timeout.as_secs(),
        "Starting breachcache server"
    );

    let service = BreachService::from_config(partition_config).await?;
    let server = Arc::new(HttpServer::bind(server_config, service.clone()).await?);

    let server_task = tokio::spawn({
        let server = server.clone();
        async move { server.run().await }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    server.shutdown();
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server exited with error"),
        Err(e) => error!(error = %e, "HTTP server task failed"),
    }

    service.shutdown().await;
    info!("Breachcache server stopped");
    Ok(())
}
