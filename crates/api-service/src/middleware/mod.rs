//! Middleware for the API service.

pub mod auth;
pub mod http_metrics;

pub use auth::{get_identity, require_auth, AuthOutcome, AuthState, IdentityExt, Rejection};
pub use http_metrics::http_metrics_middleware;
