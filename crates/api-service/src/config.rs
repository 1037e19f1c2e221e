//! API service configuration.
//!
//! Configuration is loaded from environment variables. The JWKS, issuer and
//! audience settings default to values derived from `AUTH_BASE_URL`.

use crate::auth::jwks::DEFAULT_FETCH_TIMEOUT;
use crate::auth::key_cache::DEFAULT_CACHE_TTL;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default identity provider base URL.
pub const DEFAULT_AUTH_BASE_URL: &str = "http://localhost:3000";

/// JWKS path appended to `AUTH_BASE_URL` when `AUTH_JWKS_URL` is unset.
pub const DEFAULT_JWKS_PATH: &str = "/api/auth/jwks";

/// Upper bound for `JWKS_FETCH_TIMEOUT_SECONDS`.
pub const MAX_FETCH_TIMEOUT_SECONDS: u64 = 60;

/// API service configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// URL of the identity provider's JWKS endpoint.
    pub jwks_url: String,

    /// Expected `iss` claim.
    pub issuer: String,

    /// Expected `aud` claim entry.
    pub audience: String,

    /// Seconds a fetched key set stays fresh.
    pub jwks_cache_ttl_seconds: u64,

    /// Timeout for one JWKS fetch.
    pub jwks_fetch_timeout_seconds: u64,

    /// JWT clock skew tolerance in seconds.
    pub jwt_clock_skew_seconds: u64,

    /// Extra claims copied into the identity verbatim.
    pub extra_claims: Vec<String>,

    /// Seconds to keep serving after a shutdown signal.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that hides URL query strings, which some
/// providers use to carry API keys.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("jwks_url", &redact_query(&self.jwks_url))
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("jwks_cache_ttl_seconds", &self.jwks_cache_ttl_seconds)
            .field("jwks_fetch_timeout_seconds", &self.jwks_fetch_timeout_seconds)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("extra_claims", &self.extra_claims)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

fn redact_query(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?[REDACTED]"),
        None => url.to_string(),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL configuration: {0}")]
    InvalidUrl(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid JWKS cache TTL configuration: {0}")]
    InvalidCacheTtl(String),

    #[error("Invalid JWKS fetch timeout configuration: {0}")]
    InvalidFetchTimeout(String),

    #[error("Invalid drain period configuration: {0}")]
    InvalidDrainSeconds(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let base_url = vars
            .get("AUTH_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_AUTH_BASE_URL.to_string());

        let jwks_url = vars
            .get("AUTH_JWKS_URL")
            .cloned()
            .unwrap_or_else(|| format!("{base_url}{DEFAULT_JWKS_PATH}"));

        if !(jwks_url.starts_with("http://") || jwks_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(format!(
                "AUTH_JWKS_URL must be an http(s) URL, got '{}'",
                jwks_url
            )));
        }

        let issuer = vars
            .get("AUTH_ISSUER")
            .cloned()
            .unwrap_or_else(|| base_url.clone());

        let audience = vars
            .get("AUTH_AUDIENCE")
            .cloned()
            .unwrap_or_else(|| base_url.clone());

        let jwks_cache_ttl_seconds = match vars.get("JWKS_CACHE_TTL_SECONDS") {
            Some(value_str) => {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidCacheTtl(format!(
                        "JWKS_CACHE_TTL_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidCacheTtl(
                        "JWKS_CACHE_TTL_SECONDS must be greater than 0".to_string(),
                    ));
                }

                value
            }
            None => DEFAULT_CACHE_TTL.as_secs(),
        };

        let jwks_fetch_timeout_seconds = match vars.get("JWKS_FETCH_TIMEOUT_SECONDS") {
            Some(value_str) => {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidFetchTimeout(format!(
                        "JWKS_FETCH_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 || value > MAX_FETCH_TIMEOUT_SECONDS {
                    return Err(ConfigError::InvalidFetchTimeout(format!(
                        "JWKS_FETCH_TIMEOUT_SECONDS must be between 1 and {}, got {}",
                        MAX_FETCH_TIMEOUT_SECONDS, value
                    )));
                }

                value
            }
            None => DEFAULT_FETCH_TIMEOUT.as_secs(),
        };

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew_seconds = match vars.get("JWT_CLOCK_SKEW_SECONDS") {
            Some(value_str) => {
                let value: i64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidJwtClockSkew(format!(
                        "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value <= 0 {
                    return Err(ConfigError::InvalidJwtClockSkew(format!(
                        "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                        value
                    )));
                }

                let value = value.unsigned_abs();
                if value > MAX_CLOCK_SKEW.as_secs() {
                    return Err(ConfigError::InvalidJwtClockSkew(format!(
                        "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                        MAX_CLOCK_SKEW.as_secs(),
                        value
                    )));
                }

                value
            }
            None => DEFAULT_CLOCK_SKEW.as_secs(),
        };

        let extra_claims = vars
            .get("AUTH_EXTRA_CLAIMS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|claim| !claim.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let drain_seconds = match vars.get("DRAIN_SECONDS") {
            Some(value_str) => value_str.parse().map_err(|e| {
                ConfigError::InvalidDrainSeconds(format!(
                    "DRAIN_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?,
            None => 0,
        };

        Ok(Config {
            bind_address,
            jwks_url,
            issuer,
            audience,
            jwks_cache_ttl_seconds,
            jwks_fetch_timeout_seconds,
            jwt_clock_skew_seconds,
            extra_claims,
            drain_seconds,
        })
    }

    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_seconds)
    }

    pub fn jwks_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.jwks_fetch_timeout_seconds)
    }

    pub fn jwt_clock_skew(&self) -> Duration {
        Duration::from_secs(self.jwt_clock_skew_seconds)
    }
}
