//! Request authentication for the `/api` routes.
//!
//! Two optional credentials are supported. Each one that is configured must
//! be presented:
//!
//! - `X-API-Key: <key>` when an API key is configured
//! - `Authorization: Bearer <token>` when a bearer token is configured
//!
//! With neither configured, every request is allowed. Health, readiness and
//! metrics endpoints never require credentials.

use std::collections::HashMap;

use thiserror::Error;

use super::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,
    #[error("invalid credentials")]
    Invalid,
}

#[derive(Clone, Default)]
pub struct AuthPolicy {
    api_key: Option<String>,
    bearer_token: Option<String>,
}

impl AuthPolicy {
    pub fn new(api_key: Option<String>, bearer_token: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            bearer_token: bearer_token.filter(|t| !t.is_empty()),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.api_key.clone(), config.bearer_token.clone())
    }

    pub fn is_open(&self) -> bool {
        self.api_key.is_none() && self.bearer_token.is_none()
    }

    /// Check request headers. Header names must already be lowercased.
    pub fn authorize(&self, headers: &HashMap<String, String>) -> Result<(), AuthError> {
        if let Some(expected) = &self.api_key {
            let presented = headers.get("x-api-key").ok_or(AuthError::Missing)?;
            if !constant_time_eq(expected.as_bytes(), presented.trim().as_bytes()) {
                return Err(AuthError::Invalid);
            }
        }

        if let Some(expected) = &self.bearer_token {
            let presented = headers
                .get("authorization")
                .and_then(|value| value.strip_prefix("Bearer "))
                .ok_or(AuthError::Missing)?;
            if !constant_time_eq(expected.as_bytes(), presented.trim().as_bytes()) {
                return Err(AuthError::Invalid);
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for AuthPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthPolicy")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
