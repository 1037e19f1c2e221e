//! HTTP routes for the API service.
//!
//! Defines the Axum router and application state.

use crate::auth::{ClaimsNormalizer, ExpectedClaims, KeyCache, TokenValidator};
use crate::config::Config;
use crate::errors::ApiError;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Signing keys of the identity provider.
    pub key_cache: KeyCache,
}

/// Build the authentication gate state from configuration.
pub fn auth_state(config: &Config, key_cache: KeyCache) -> AuthState {
    AuthState::new(
        key_cache,
        TokenValidator::new(
            ExpectedClaims {
                issuer: config.issuer.clone(),
                audience: config.audience.clone(),
            },
            config.jwt_clock_skew(),
        ),
        ClaimsNormalizer::new(config.extra_claims.clone())
            .with_accepted_audience(config.audience.clone()),
    )
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness check (simple "OK") - public, unversioned
/// - `/ready` - Readiness check (signing keys cached) - public, unversioned
/// - `/metrics` - Prometheus metrics endpoint - public, unversioned
/// - `/api/v1/profile` - Profile of the caller - requires authentication
/// - `/api/v1/auth/verify` - Token check - requires authentication
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(auth_state(&state.config, state.key_cache.clone()));

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/api/v1/profile", get(handlers::get_profile))
        .route("/api/v1/auth/verify", get(handlers::verify_auth))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth));

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .fallback(|| async { ApiError::NotFound("Route not found".to_string()) })
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
