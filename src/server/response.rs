//! HTTP responses and the JSON API envelope.
//!
//! Every `/api` response body has the same shape:
//!
//! ```json
//! { "apiVersion": "1.0", "statusCode": 200, "data": { ... }, "errorMessage": null }
//! ```

use serde::Serialize;
use tracing::error;

use crate::constants::API_VERSION;

/// JSON envelope wrapping every API payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T: Serialize> {
    pub api_version: &'static str,
    pub status_code: u16,
    pub data: Option<T>,
    pub error_message: Option<String>,
}

impl<T: Serialize> ApiEnvelope<T> {
    pub fn ok(status_code: u16, data: T) -> Self {
        Self {
            api_version: API_VERSION,
            status_code,
            data: Some(data),
            error_message: None,
        }
    }
}

impl ApiEnvelope<()> {
    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            api_version: API_VERSION,
            status_code,
            data: None,
            error_message: Some(message.into()),
        }
    }
}

/// A fully rendered HTTP/1.1 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpResponse {
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.into(),
        }
    }

    /// Serialize `envelope`. Falls back to a bare 500 if serialization fails.
    pub fn json<T: Serialize>(envelope: &ApiEnvelope<T>) -> Self {
        match serde_json::to_string(envelope) {
            Ok(body) => Self {
                status: envelope.status_code,
                content_type: "application/json",
                body,
            },
            Err(e) => {
                error!(error = %e, "Failed to serialize response envelope");
                Self::text(500, "error: failed to serialize response\n")
            }
        }
    }

    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::json(&ApiEnvelope::error(status, message))
    }

    /// Serialize status line, headers and body.
    pub fn to_http(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n\
             {}",
            self.status,
            status_text(self.status),
            self.content_type,
            self.body.len(),
            self.body
        )
    }
}

/// Reason phrase for the status codes this server emits.
pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
