//! # API Test Utilities
//!
//! Shared test utilities for the Gatehouse API service.
//!
//! This crate provides:
//! - Deterministic Ed25519 signing keys and JWKS documents
//! - `TestTokenBuilder` for JWT claim sets
//! - A wiremock JWKS endpoint
//! - Server test harness (`TestApiServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use api_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestApiServer::spawn().await?;
//!     let token = server.keypair().sign(&TestTokenBuilder::new().for_user("u1").build());
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/api/v1/profile", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_mock;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_mock::*;
pub use server_harness::*;
pub use token_builders::*;
