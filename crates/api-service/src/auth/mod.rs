//! Authentication module for the API service.
//!
//! This module validates bearer JWTs against a remote JSON Web Key Set.
//!
//! # Components
//!
//! - `keyset` - JWK parsing into an immutable, kid-indexed key set
//! - `jwks` - JWKS fetcher (one GET, no retries)
//! - `key_cache` - TTL cache with single-flight refresh and stale fallback
//! - `jwt` - Token validation against a key set
//! - `claims` - Normalization of verified claims into an `Identity`

pub mod claims;
pub mod jwks;
pub mod jwt;
pub mod key_cache;
pub mod keyset;

pub use claims::{ClaimShapeError, ClaimsNormalizer, Identity, RawClaims};
pub use jwks::{HttpJwksFetcher, JwksFetcher, KeyFetchError};
pub use jwt::{ExpectedClaims, TokenError, TokenInvalidReason, TokenValidator};
pub use key_cache::KeyCache;
pub use keyset::{KeySet, VerificationKey};
