//! Gatehouse API Service Library
//!
//! This library provides the core functionality for the Gatehouse API
//! service - an HTTP API that authenticates every protected request with a
//! bearer JWT issued by an external identity provider:
//!
//! - Key material is fetched from the provider's JWKS endpoint and cached
//! - Tokens are verified against the cached key set (signature + claims)
//! - Claim payloads are normalized into a typed `Identity`
//! - The `Identity` is attached to the request for downstream handlers
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth/{key_cache,jwt,claims}.rs -> handlers/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Key cache, JWKS fetcher, token validator, claims normalizer
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication gate and HTTP metrics
//! - `models` - Response models
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
