//! JWKS fetcher for the identity provider's public keys.
//!
//! A fetch is a single HTTP GET against the configured JWKS URL, bounded by
//! a timeout. There are no retries: the key cache decides when to try again.
//!
//! # Security
//!
//! - HTTPS should be used in production (enforced by deployment config)
//! - Error details are logged, never returned to clients

use crate::auth::keyset::{JwksDocument, KeySet};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Default JWKS fetch timeout (10 seconds).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a usable key set could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyFetchError {
    #[error("JWKS request failed: {0}")]
    Network(String),

    #[error("JWKS request timed out")]
    Timeout,

    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    #[error("Malformed JWKS document: {0}")]
    Malformed(String),

    #[error("JWKS document contains no usable signing keys")]
    NoUsableKeys,

    #[error("JWKS refresh task did not complete")]
    RefreshAborted,
}

impl KeyFetchError {
    /// Bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            KeyFetchError::Network(_) => "network",
            KeyFetchError::Timeout => "timeout",
            KeyFetchError::Status(_) => "status",
            KeyFetchError::Malformed(_) => "malformed",
            KeyFetchError::NoUsableKeys => "no_usable_keys",
            KeyFetchError::RefreshAborted => "aborted",
        }
    }
}

/// Source of key sets for the key cache.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    /// Fetch and parse the current key set.
    async fn fetch(&self) -> Result<KeySet, KeyFetchError>;
}

/// Fetches the key set from a JWKS URL over HTTP.
pub struct HttpJwksFetcher {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client with the fetch timeout applied.
    http_client: reqwest::Client,
}

impl HttpJwksFetcher {
    /// Create a new fetcher.
    ///
    /// # Arguments
    ///
    /// * `jwks_url` - URL to the identity provider's JWKS endpoint
    /// * `timeout` - Upper bound for the whole request, including body
    pub fn new(jwks_url: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "api.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
        }
    }

    /// The JWKS URL this fetcher targets.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    async fn fetch(&self) -> Result<KeySet, KeyFetchError> {
        tracing::debug!(target: "api.auth.jwks", "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                target: "api.auth.jwks",
                status = %status,
                "JWKS endpoint returned error"
            );
            return Err(KeyFetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(map_transport_error)?;

        let document: JwksDocument = serde_json::from_slice(&body).map_err(|e| {
            tracing::error!(target: "api.auth.jwks", error = %e, "Failed to parse JWKS response");
            KeyFetchError::Malformed(e.to_string())
        })?;

        let keyset = KeySet::from_document(&document)?;

        tracing::info!(
            target: "api.auth.jwks",
            key_count = keyset.len(),
            kids = ?keyset.kids(),
            "JWKS fetched"
        );

        Ok(keyset)
    }
}

fn map_transport_error(e: reqwest::Error) -> KeyFetchError {
    if e.is_timeout() {
        tracing::error!(target: "api.auth.jwks", error = %e, "JWKS request timed out");
        KeyFetchError::Timeout
    } else {
        tracing::error!(target: "api.auth.jwks", error = %e, "Failed to fetch JWKS");
        KeyFetchError::Network(e.to_string())
    }
}
