//! Health check handlers.
//!
//! - `/health`: Liveness check - returns OK if the process is running
//! - `/ready`: Readiness check - ready once a key set has been cached

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Liveness check handler.
///
/// Does NOT check any dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness check handler.
///
/// Returns 200 once the key cache holds a key set (fresh or stale), 503
/// before the first successful fetch. Does not trigger a fetch itself.
#[tracing::instrument(skip_all, name = "api.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let keys_cached = state.key_cache.key_count().await;

    if keys_cached == 0 {
        tracing::warn!(target: "api.health", "Readiness check failed: no signing keys cached");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                jwks: "unavailable",
                keys_cached: None,
                error: Some("Service dependencies unavailable".to_string()),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            jwks: "available",
            keys_cached: Some(keys_cached),
            error: None,
        }),
    )
}
