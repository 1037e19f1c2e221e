//! Metrics definitions for the API service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `api_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: HTTP methods
//! - `endpoint`: the routed paths plus `/other`
//! - `status`: 3 values (success, error, timeout)
//! - `outcome`: `authenticated` plus one value per rejection kind
//! - `error_type`: bounded by `KeyFetchError` variants

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("api_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // JWKS fetches are bounded by the fetch timeout (max 60s)
        .set_buckets_for_metric(
            Matcher::Prefix("api_jwks_refresh".to_string()),
            &[
                0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000,
            ],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `api_http_requests_total`, `api_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("api_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("api_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion.
///
/// Unknown paths collapse to `/other`.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/api/v1/profile" => "/api/v1/profile",
        "/api/v1/auth/verify" => "/api/v1/auth/verify",
        _ => "/other",
    }
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record the outcome of one authentication attempt.
///
/// Metric: `api_auth_outcomes_total`
/// Labels: `outcome` ("authenticated" or a rejection code such as "expired")
pub fn record_auth_outcome(outcome: &str) {
    counter!("api_auth_outcomes_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Record a JWKS refresh attempt.
///
/// Emits:
/// - `api_jwks_refresh_total` counter (labels: `status`)
/// - `api_jwks_refresh_duration_seconds` histogram (no labels)
/// - `api_jwks_refresh_failures_total` counter (labels: `error_type`, on failure only)
///
/// # Arguments
///
/// * `status` - "success" or "error"
/// * `error_type` - `KeyFetchError::kind()` for failures
/// * `duration` - Duration of the fetch
pub fn record_jwks_refresh(status: &str, error_type: Option<&str>, duration: Duration) {
    histogram!("api_jwks_refresh_duration_seconds").record(duration.as_secs_f64());

    counter!("api_jwks_refresh_total",
        "status" => status.to_string()
    )
    .increment(1);

    if let Some(err_type) = error_type {
        counter!("api_jwks_refresh_failures_total",
            "error_type" => err_type.to_string()
        )
        .increment(1);
    }
}

/// Set the number of verification keys currently cached.
///
/// Metric: `api_jwks_keys_cached`
/// Type: Gauge
pub fn set_jwks_keys_cached(count: usize) {
    gauge!("api_jwks_keys_cached").set(count as f64);
}
