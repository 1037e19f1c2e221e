//! JWT utilities shared across Gatehouse crates.
//!
//! This module provides the structural and temporal checks that do not
//! depend on key material:
//! - Size limits for DoS prevention
//! - Clock skew constants
//! - Key ID extraction from JWT headers
//! - `exp` / `nbf` / `iat` checks with clock skew tolerance
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Header inspection never verifies anything; the `kid` it returns is only
//!   a lookup key into a trusted key set
//! - Error messages are intentionally generic to prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{extract_kid, validate_exp_at, validate_iat_at, DEFAULT_CLOCK_SKEW};
//!
//! let kid = extract_kid(token)?;
//! // ... resolve key, verify signature ...
//! validate_exp_at(exp, DEFAULT_CLOCK_SKEW, now)?;
//! validate_iat_at(iat, DEFAULT_CLOCK_SKEW, now)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this are rejected BEFORE any base64 decoding or
/// cryptographic work. Typical identity-provider tokens are well under 2KB.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default JWT clock skew tolerance (30 seconds).
///
/// Applied symmetrically: tokens are accepted until `skew` after `exp`, and
/// `iat` / `nbf` may be up to `skew` in the future.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(30);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Prevents misconfiguration that would make expiry effectively meaningless.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during structural or temporal JWT checks.
///
/// Note: Display messages are intentionally generic. Callers that need the
/// precise reason match on the variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token `exp` claim is further in the past than the skew allows.
    #[error("The access token is invalid or expired")]
    Expired,

    /// Token `nbf` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    NotYetValid,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Functions
// =============================================================================

/// Extract the `kid` (key ID) from a JWT header without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing
/// - This function does NOT validate the token signature
/// - The `kid` value must only be used for key lookup in a trusted key set
///
/// # Errors
///
/// Returns `JwtValidationError` variants:
/// - `TokenTooLarge` - Token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - Wrong structure, bad base64, or header is not a JSON object
/// - `MissingKid` - Header has no `kid`, or `kid` is not a non-empty string
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|part| part.is_empty()) {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    let header_part = parts.first().ok_or(JwtValidationError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    if !header.is_object() {
        return Err(JwtValidationError::MalformedToken);
    }

    header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)
}

/// Current Unix time in seconds.
#[must_use]
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Clock skew as whole seconds.
fn skew_secs(clock_skew: Duration) -> i64 {
    i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX)
}

/// Validate the `exp` (expiration) claim against `now` with skew tolerance.
///
/// A token is rejected only when `exp < now - skew`; a token that expired
/// exactly `skew` seconds ago is still accepted.
///
/// # Errors
///
/// Returns `JwtValidationError::Expired` if the token expired more than
/// `clock_skew` ago.
pub fn validate_exp_at(exp: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let min_exp = now.saturating_sub(skew_secs(clock_skew));

    if exp < min_exp {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            min_allowed = min_exp,
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired);
    }

    Ok(())
}

/// Validate the `nbf` (not-before) claim against `now` with skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::NotYetValid` if `nbf` is more than
/// `clock_skew` in the future.
pub fn validate_nbf_at(nbf: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let max_nbf = now.saturating_add(skew_secs(clock_skew));

    if nbf > max_nbf {
        tracing::debug!(
            target: "common.jwt",
            nbf = nbf,
            now = now,
            max_allowed = max_nbf,
            "Token rejected: not yet valid"
        );
        return Err(JwtValidationError::NotYetValid);
    }

    Ok(())
}

/// Validate the `iat` (issued-at) claim against `now` with skew tolerance.
///
/// Rejects tokens with `iat` too far in the future, which points at token
/// pre-generation or a badly drifting issuer clock.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is
/// more than `clock_skew` in the future.
pub fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let max_iat = now.saturating_add(skew_secs(clock_skew));

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
