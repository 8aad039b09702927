//! HTTP API server.
//!
//! A small HTTP/1.1 server on a tokio `TcpListener`. One request per
//! connection, `Connection: close` on every response.
//!
//! # Endpoints
//!
//! - `GET /api/pwned/{email}` - 200 if breached, 404 otherwise
//! - `POST /api/pwned/{email}` - 201 if newly recorded, 409 if already known
//! - `GET /health` - Liveness check (always 200 while the server runs)
//! - `GET /ready` - Readiness check (503 once shutdown has begun)
//! - `GET /metrics` - Prometheus metrics in text format
//!
//! `/api` routes require the configured credentials (see [`auth`]).
//!
//! # Usage
//!
//! ```rust,no_run
//! use breachcache::partition::PartitionConfig;
//! use breachcache::server::{HttpServer, ServerConfig};
//! use breachcache::service::BreachService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = BreachService::from_config(PartitionConfig::default()).await?;
//!     let server = HttpServer::bind(ServerConfig::default(), service).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod response;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::constants::{
    DEFAULT_LISTEN_ADDR, DEFAULT_REQUEST_READ_TIMEOUT_SECS, MAX_REQUEST_HEAD_SIZE,
};
use crate::error::{Error, Result};
use crate::partition::metrics::{HTTP_REQUESTS, encode_metrics};
use crate::service::BreachService;
use crate::types::{AddOutcome, CheckOutcome};

pub use auth::{AuthError, AuthPolicy};
pub use response::{ApiEnvelope, HttpResponse};

const API_PREFIX: &str = "/api/pwned/";

/// Listener and credential settings.
#[derive(Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub api_key: Option<String>,
    pub bearer_token: Option<String>,
    /// Time allowed for a client to send the request head.
    pub request_read_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            api_key: None,
            bearer_token: None,
            request_read_timeout: Duration::from_secs(DEFAULT_REQUEST_READ_TIMEOUT_SECS),
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("listen_addr", &self.listen_addr)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("request_read_timeout", &self.request_read_timeout)
            .finish()
    }
}

impl ServerConfig {
    /// Load from environment variables.
    ///
    /// - `LISTEN_ADDR` (default `0.0.0.0:8080`)
    /// - `API_KEY`, `BEARER_TOKEN` (optional)
    /// - `REQUEST_READ_TIMEOUT_SECS` (default 30)
    pub fn from_env() -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let listen_addr =
            std::env::var("LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
        let request_read_timeout_secs: u64 = std::env::var("REQUEST_READ_TIMEOUT_SECS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .map_err(|e| format!("Invalid REQUEST_READ_TIMEOUT_SECS: {}", e))?
            .unwrap_or(DEFAULT_REQUEST_READ_TIMEOUT_SECS);

        Ok(Self {
            listen_addr,
            api_key: std::env::var("API_KEY").ok(),
            bearer_token: std::env::var("BEARER_TOKEN").ok(),
            request_read_timeout: Duration::from_secs(request_read_timeout_secs),
        })
    }

    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "listen_addr '{}' is not a socket address",
                self.listen_addr
            ));
        }
        if self.request_read_timeout.is_zero() {
            errors.push("request_read_timeout must be > 0".to_string());
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Parsed request line and headers. Bodies are never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    /// Path without the query string, still percent-encoded.
    pub path: String,
    /// Header names lowercased.
    pub headers: HashMap<String, String>,
}

impl HttpRequest {
    /// Parse a request head. Returns `None` if the request line is malformed.
    pub fn parse(head: &str) -> Option<Self> {
        let mut lines = head.lines();
        let mut request_line = lines.next()?.split_whitespace();
        let method = request_line.next()?.to_ascii_uppercase();
        let target = request_line.next()?;
        let path = target.split(['?', '#']).next().unwrap_or(target).to_string();

        let headers = lines
            .take_while(|line| !line.is_empty())
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                Some((name.trim().to_ascii_lowercase(), value.trim().to_string()))
            })
            .collect();

        Some(Self {
            method,
            path,
            headers,
        })
    }
}

/// Decode `%XX` escapes. Returns `None` on a truncated or invalid escape or
/// if the result is not UTF-8.
pub fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3)?;
                if !hex.iter().all(u8::is_ascii_hexdigit) {
                    return None;
                }
                let hex = std::str::from_utf8(hex).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddData {
    email: String,
    added: bool,
}

/// Maps parsed requests to responses. Independent of the socket so it can
/// be exercised directly.
#[derive(Debug, Clone)]
pub struct Router {
    service: BreachService,
    auth: AuthPolicy,
}

impl Router {
    pub fn new(service: BreachService, auth: AuthPolicy) -> Self {
        Self { service, auth }
    }

    pub fn service(&self) -> &BreachService {
        &self.service
    }

    pub async fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let (route, response) = self.dispatch(request).await;
        let status = response.status.to_string();
        HTTP_REQUESTS
            .with_label_values(&[route, status.as_str()])
            .inc();
        response
    }

    async fn dispatch(&self, request: &HttpRequest) -> (&'static str, HttpResponse) {
        let path = request.path.as_str();

        if let Some(encoded) = path.strip_prefix(API_PREFIX) {
            return ("api", self.handle_api(request, encoded).await);
        }

        match path {
            "/health" | "/healthz" | "/health/" => {
                ("health", HttpResponse::text(200, "status: healthy\n"))
            }
            "/ready" | "/readyz" | "/ready/" => ("ready", self.ready_response()),
            "/metrics" => ("metrics", metrics_response()),
            _ => ("unknown", not_found_response()),
        }
    }

    async fn handle_api(&self, request: &HttpRequest, encoded: &str) -> HttpResponse {
        if let Err(e) = self.auth.authorize(&request.headers) {
            debug!(error = %e, "Rejected unauthenticated request");
            return HttpResponse::api_error(401, e.to_string());
        }

        let Some(email) = percent_decode(encoded).filter(|e| !e.is_empty() && !e.contains('/'))
        else {
            return HttpResponse::api_error(400, "email path segment is missing or malformed");
        };

        match request.method.as_str() {
            "GET" => match self.service.check(&email).await {
                Ok(CheckOutcome::Found(result)) => HttpResponse::json(&ApiEnvelope::ok(200, result)),
                Ok(CheckOutcome::NotFound(result)) => {
                    HttpResponse::json(&ApiEnvelope::ok(404, result))
                }
                Err(e) => error_response(e),
            },
            "POST" => match self.service.add(&email).await {
                Ok(AddOutcome::Created(email)) => HttpResponse::json(&ApiEnvelope::ok(
                    201,
                    AddData { email, added: true },
                )),
                Ok(AddOutcome::Conflict(email)) => HttpResponse::json(&ApiEnvelope::ok(
                    409,
                    AddData {
                        email,
                        added: false,
                    },
                )),
                Err(e) => error_response(e),
            },
            other => HttpResponse::api_error(405, format!("method {} not allowed", other)),
        }
    }

    fn ready_response(&self) -> HttpResponse {
        if self.service.is_shutting_down() {
            HttpResponse::text(503, "status: not_ready\nreason: shutting_down\n")
        } else {
            HttpResponse::text(200, "status: ready\n")
        }
    }
}

fn error_response(e: Error) -> HttpResponse {
    let status = if e.is_client_error() {
        400
    } else if e.is_transient() {
        503
    } else {
        500
    };
    if status == 500 {
        error!(error = %e, "Request failed");
    } else {
        debug!(error = %e, status, "Request failed");
    }
    HttpResponse::api_error(status, e.to_string())
}

fn metrics_response() -> HttpResponse {
    match encode_metrics() {
        Ok(body) => HttpResponse {
            status: 200,
            content_type: "text/plain; version=0.0.4; charset=utf-8",
            body,
        },
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            HttpResponse::text(500, "error: failed to encode metrics\n")
        }
    }
}

fn not_found_response() -> HttpResponse {
    HttpResponse::text(
        404,
        "Available endpoints:\n\
         - GET /api/pwned/{email} - Check an address\n\
         - POST /api/pwned/{email} - Record a breached address\n\
         - /health - Liveness check\n\
         - /ready - Readiness check\n\
         - /metrics - Prometheus metrics\n",
    )
}

enum HeadRead {
    Complete(String),
    Closed,
    TooLarge,
}

/// Read until the blank line ending the request head.
async fn read_head<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<HeadRead> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(if buf.is_empty() {
                HeadRead::Closed
            } else {
                HeadRead::Complete(String::from_utf8_lossy(&buf).into_owned())
            });
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            return Ok(HeadRead::Complete(
                String::from_utf8_lossy(&buf[..end]).into_owned(),
            ));
        }
        if buf.len() > MAX_REQUEST_HEAD_SIZE {
            return Ok(HeadRead::TooLarge);
        }
    }
}

pub struct HttpServer {
    listener: TcpListener,
    router: Arc<Router>,
    shutdown_tx: broadcast::Sender<()>,
    read_timeout: Duration,
}

impl HttpServer {
    /// Bind to `config.listen_addr`.
    pub async fn bind(config: ServerConfig, service: BreachService) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr.as_str()).await?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let auth = AuthPolicy::from_config(&config);

        info!(
            addr = %config.listen_addr,
            auth = if auth.is_open() { "none" } else { "required" },
            "HTTP server listening"
        );

        Ok(Self {
            listener,
            router: Arc::new(Router::new(service, auth)),
            shutdown_tx,
            read_timeout: config.request_read_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Stop accepting connections. In-flight requests finish on their own tasks.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("HTTP server shutdown signal sent");
    }

    /// Accept connections until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("HTTP server shutting down");
                    return Ok(());
                }
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((mut stream, addr)) => {
                            debug!(client_addr = %addr, "Accepted connection");
                            let router = self.router.clone();
                            let read_timeout = self.read_timeout;

                            tokio::spawn(async move {
                                let response = match tokio::time::timeout(read_timeout, read_head(&mut stream)).await {
                                    Ok(Ok(HeadRead::Complete(head))) => match HttpRequest::parse(&head) {
                                        Some(request) => router.handle(&request).await,
                                        None => HttpResponse::text(400, "error: malformed request line\n"),
                                    },
                                    Ok(Ok(HeadRead::TooLarge)) => HttpResponse::text(413, "error: request head too large\n"),
                                    Ok(Ok(HeadRead::Closed)) => {
                                        debug!(client_addr = %addr, "Connection closed before request");
                                        return;
                                    }
                                    Ok(Err(e)) => {
                                        debug!(client_addr = %addr, error = ?e, "Failed to read request");
                                        return;
                                    }
                                    Err(_) => {
                                        debug!(client_addr = %addr, "Timed out reading request");
                                        return;
                                    }
                                };
                                if let Err(e) = stream.write_all(response.to_http().as_bytes()).await {
                                    debug!(error = ?e, "Failed to write response");
                                }
                                let _ = stream.shutdown().await;
                            });
                        }
                        Err(e) => {
                            warn!(error = ?e, "Failed to accept connection");
                        }
                    }
                }
            }
        }
    }
}
