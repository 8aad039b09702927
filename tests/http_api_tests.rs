//! HTTP API tests against a live listener.
//!
//! Each test binds an ephemeral port, drives raw HTTP/1.1 over TCP and
//! asserts on status codes and the JSON envelope.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test http_api_tests
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use breachcache::error::{Error, Result};
use breachcache::partition::{ActorRegistry, MemoryStore, PartitionConfig};
use breachcache::server::{HttpServer, ServerConfig};
use breachcache::service::BreachService;

struct TestServer {
    addr: SocketAddr,
    server: Arc<HttpServer>,
    service: BreachService,
    handle: JoinHandle<Result<()>>,
}

impl TestServer {
    /// Returns None where the sandbox forbids binding sockets.
    async fn start(api_key: Option<&str>, bearer_token: Option<&str>) -> Option<Self> {
        let registry = ActorRegistry::new(PartitionConfig::default(), Arc::new(MemoryStore::new()));
        let service = BreachService::new(registry);
        let config = ServerConfig {
            listen_addr: "127.0.0.1:0".into(),
            api_key: api_key.map(String::from),
            bearer_token: bearer_token.map(String::from),
            ..Default::default()
        };

        let server = match HttpServer::bind(config, service.clone()).await {
            Ok(server) => Arc::new(server),
            Err(Error::Io(std::io::ErrorKind::PermissionDenied)) => return None,
            Err(e) => panic!("Unexpected error: {:?}", e),
        };
        let addr = server.local_addr().unwrap();
        let handle = tokio::spawn({
            let server = server.clone();
            async move { server.run().await }
        });

        Some(Self {
            addr,
            server,
            service,
            handle,
        })
    }

    async fn send(&self, method: &str, path: &str, headers: &[(&str, &str)]) -> (u16, String) {
        let mut request = format!("{} {} HTTP/1.1\r\nHost: localhost\r\n", method, path);
        for (name, value) in headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }
        request.push_str("\r\n");

        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        let status = raw
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .expect("status line");
        let body = raw
            .split_once("\r\n\r\n")
            .map(|(_, body)| body.to_string())
            .unwrap_or_default();
        (status, body)
    }

    async fn stop(self) {
        self.server.shutdown();
        assert!(self.handle.await.unwrap().is_ok());
        self.service.shutdown().await;
    }
}

fn json(body: &str) -> Value {
    serde_json::from_str(body).expect("JSON body")
}

// ============================================================================
// Lookup and add
// ============================================================================

#[tokio::test]
async fn test_add_then_lookup() {
    let Some(server) = TestServer::start(None, None).await else {
        return;
    };

    let (status, body) = server.send("GET", "/api/pwned/a%40example.com", &[]).await;
    assert_eq!(status, 404);
    let body = json(&body);
    assert_eq!(body["data"]["isPwned"], false);
    assert_eq!(body["data"]["breachCount"], 0);

    let (status, body) = server.send("POST", "/api/pwned/A@Example.com", &[]).await;
    assert_eq!(status, 201);
    let body = json(&body);
    assert_eq!(body["apiVersion"], "1.0");
    assert_eq!(body["statusCode"], 201);
    assert_eq!(body["data"]["email"], "a@example.com");

    let (status, _) = server.send("POST", "/api/pwned/a@example.com", &[]).await;
    assert_eq!(status, 409);

    let (status, body) = server.send("GET", "/api/pwned/a@example.com", &[]).await;
    assert_eq!(status, 200);
    let body = json(&body);
    assert_eq!(body["data"]["isPwned"], true);
    assert_eq!(body["data"]["source"], "memory");
    assert!(body["data"]["checkedAtUtc"].is_string());

    server.stop().await;
}

#[tokio::test]
async fn test_invalid_email_is_bad_request() {
    let Some(server) = TestServer::start(None, None).await else {
        return;
    };

    let (status, body) = server.send("GET", "/api/pwned/not-an-email", &[]).await;
    assert_eq!(status, 400);
    assert!(json(&body)["errorMessage"].is_string());

    server.stop().await;
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let Some(server) = TestServer::start(Some("s3cret"), None).await else {
        return;
    };

    let (status, _) = server.send("GET", "/api/pwned/a@example.com", &[]).await;
    assert_eq!(status, 401);

    let (status, _) = server
        .send("GET", "/api/pwned/a@example.com", &[("X-API-Key", "wrong")])
        .await;
    assert_eq!(status, 401);

    let (status, _) = server
        .send("GET", "/api/pwned/a@example.com", &[("X-API-Key", "s3cret")])
        .await;
    assert_eq!(status, 404);

    // Probes stay open.
    let (status, _) = server.send("GET", "/health", &[]).await;
    assert_eq!(status, 200);

    server.stop().await;
}

#[tokio::test]
async fn test_bearer_token_required_when_configured() {
    let Some(server) = TestServer::start(None, Some("tok")).await else {
        return;
    };

    let (status, _) = server.send("POST", "/api/pwned/a@example.com", &[]).await;
    assert_eq!(status, 401);

    let (status, _) = server
        .send("POST", "/api/pwned/a@example.com", &[("Authorization", "Bearer tok")])
        .await;
    assert_eq!(status, 201);

    server.stop().await;
}

// ============================================================================
// Operational endpoints
// ============================================================================

#[tokio::test]
async fn test_ready_flips_on_shutdown() {
    let Some(server) = TestServer::start(None, None).await else {
        return;
    };

    let (status, _) = server.send("GET", "/ready", &[]).await;
    assert_eq!(status, 200);

    server.service.shutdown().await;
    let (status, _) = server.send("GET", "/ready", &[]).await;
    assert_eq!(status, 503);

    let (status, _) = server.send("GET", "/api/pwned/a@example.com", &[]).await;
    assert_eq!(status, 503);

    server.stop().await;
}

#[tokio::test]
async fn test_metrics_exposed() {
    let Some(server) = TestServer::start(None, None).await else {
        return;
    };

    server.send("POST", "/api/pwned/m@example.com", &[]).await;
    let (status, body) = server.send("GET", "/metrics", &[]).await;
    assert_eq!(status, 200);
    assert!(body.contains("breachcache_"));

    server.stop().await;
}
