//! API-key authentication.
//!
//! Clients present a `consumer_key`/`consumer_secret` pair either as HTTP
//! Basic credentials or as query parameters. Keys carry a scope: `read` keys
//! may call read endpoints, `write` keys may call everything. Secrets are
//! compared as SHA-256 digests so lookup never branches on secret bytes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

use crate::config::ApiKeyEntry;
use crate::errors::ServiceError;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    Read,
    Write,
}

impl KeyScope {
    fn parse(s: &str) -> KeyScope {
        if s.eq_ignore_ascii_case("write") {
            KeyScope::Write
        } else {
            KeyScope::Read
        }
    }

    pub fn grants(self, required: KeyScope) -> bool {
        match required {
            KeyScope::Read => true,
            KeyScope::Write => self == KeyScope::Write,
        }
    }
}

#[derive(Clone)]
struct ApiKey {
    consumer_key: String,
    secret_digest: [u8; 32],
    scope: KeyScope,
}

/// The configured key set, built once at startup.
#[derive(Clone, Default)]
pub struct AuthKeys {
    keys: Vec<ApiKey>,
}

fn digest(secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

impl AuthKeys {
    pub fn from_config(entries: &[ApiKeyEntry]) -> Self {
        Self {
            keys: entries
                .iter()
                .map(|entry| ApiKey {
                    consumer_key: entry.consumer_key.clone(),
                    secret_digest: digest(&entry.consumer_secret),
                    scope: KeyScope::parse(&entry.scope),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Verifies a presented pair, returning its scope.
    pub fn verify(&self, consumer_key: &str, consumer_secret: &str) -> Option<KeyScope> {
        let presented = digest(consumer_secret);
        self.keys
            .iter()
            .find(|key| key.consumer_key == consumer_key && key.secret_digest == presented)
            .map(|key| key.scope)
    }
}

/// Pulls credentials from the Authorization header or the query string.
fn credentials_from_request(req: &Request) -> Option<(String, String)> {
    if let Some(value) = req.headers().get(header::AUTHORIZATION) {
        let value = value.to_str().ok()?;
        let encoded = value.strip_prefix("Basic ")?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (key, secret) = decoded.split_once(':')?;
        return Some((key.to_string(), secret.to_string()));
    }

    let query = req.uri().query()?;
    let mut consumer_key = None;
    let mut consumer_secret = None;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("consumer_key", v)) => consumer_key = Some(v.to_string()),
            Some(("consumer_secret", v)) => consumer_secret = Some(v.to_string()),
            _ => {}
        }
    }
    Some((consumer_key?, consumer_secret?))
}

async fn require_scope(
    state: &AppState,
    req: Request,
    next: Next,
    required: KeyScope,
) -> Result<Response, ServiceError> {
    let (key, secret) = credentials_from_request(&req).ok_or(ServiceError::Unauthorized)?;
    let scope = state
        .auth
        .verify(&key, &secret)
        .ok_or(ServiceError::Unauthorized)?;
    if !scope.grants(required) {
        debug!(consumer_key = %key, "key lacks write scope");
        return Err(ServiceError::InsufficientPermissions);
    }
    Ok(next.run(req).await)
}

pub async fn require_read(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    require_scope(&state, req, next, KeyScope::Read).await
}

pub async fn require_write(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    require_scope(&state, req, next, KeyScope::Write).await
}
