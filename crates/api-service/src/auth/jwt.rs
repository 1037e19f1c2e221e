//! JWT validation against a cached key set.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The key is chosen by `kid`, and the token's `alg` must equal the
//!   algorithm that key is bound to (no algorithm confusion)
//! - `jsonwebtoken` verifies the signature only; issuer, audience and time
//!   checks are done here so their boundaries are exact
//! - Failure reasons are returned to the gate; clients only see a generic
//!   message

use crate::auth::claims::{required, Audience, ClaimKind, ClaimShapeError, NumericDate, RawClaims};
use crate::auth::keyset::KeySet;
use common::jwt::{
    extract_kid, now_timestamp, validate_exp_at, validate_iat_at, validate_nbf_at,
    JwtValidationError,
};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Validation};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Issuer and audience a token must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedClaims {
    pub issuer: String,
    pub audience: String,
}

/// Why a token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenInvalidReason {
    #[error("malformed token")]
    Malformed,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("unknown key id")]
    UnknownKeyId,

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,
}

impl TokenInvalidReason {
    /// Stable code used in error bodies and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenInvalidReason::Malformed => "malformed",
            TokenInvalidReason::SignatureMismatch => "signature-mismatch",
            TokenInvalidReason::UnknownKeyId => "unknown-key-id",
            TokenInvalidReason::IssuerMismatch => "issuer-mismatch",
            TokenInvalidReason::AudienceMismatch => "audience-mismatch",
            TokenInvalidReason::Expired => "expired",
            TokenInvalidReason::NotYetValid => "not-yet-valid",
        }
    }
}

/// Token validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(TokenInvalidReason),

    #[error(transparent)]
    ClaimShape(#[from] ClaimShapeError),
}

impl From<TokenInvalidReason> for TokenError {
    fn from(reason: TokenInvalidReason) -> Self {
        TokenError::Invalid(reason)
    }
}

/// Validates bearer tokens for one issuer/audience pair.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    expected: ExpectedClaims,
    clock_skew: Duration,
}

impl TokenValidator {
    /// Create a new validator.
    ///
    /// # Arguments
    ///
    /// * `expected` - Issuer and audience tokens must carry
    /// * `clock_skew` - Tolerance applied to `exp`, `nbf` and `iat`
    pub fn new(expected: ExpectedClaims, clock_skew: Duration) -> Self {
        Self {
            expected,
            clock_skew,
        }
    }

    pub fn expected(&self) -> &ExpectedClaims {
        &self.expected
    }

    /// Validate a token against `keys` at the current time.
    ///
    /// # Errors
    ///
    /// See [`TokenValidator::validate_at`].
    pub fn validate(&self, token: &str, keys: &KeySet) -> Result<RawClaims, TokenError> {
        self.validate_at(token, keys, now_timestamp())
    }

    /// Validate a token against `keys` as of `now` (Unix seconds).
    ///
    /// # Checks
    ///
    /// 1. Size and structure, header `kid` and `alg`
    /// 2. Key lookup by `kid`, `alg` must match the key
    /// 3. Signature
    /// 4. `iss` exact match, `aud` contains the expected audience
    /// 5. `exp >= now - skew`, `nbf <= now + skew`, `iat <= now + skew`
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Invalid` with the first failing reason, or
    /// `TokenError::ClaimShape` if `iss`, `aud`, `exp` or `iat` is missing or
    /// mistyped.
    #[instrument(skip_all, name = "api.auth.jwt.validate")]
    pub fn validate_at(
        &self,
        token: &str,
        keys: &KeySet,
        now: i64,
    ) -> Result<RawClaims, TokenError> {
        // 1. Structure (includes size check via common::jwt)
        let kid = extract_kid(token);
        if let Err(JwtValidationError::TokenTooLarge | JwtValidationError::MalformedToken) = kid {
            tracing::debug!(target: "api.auth.jwt", "Token structure invalid");
            return Err(TokenInvalidReason::Malformed.into());
        }

        let header = decode_header(token).map_err(|e| {
            tracing::debug!(target: "api.auth.jwt", error = %e, "Token header invalid");
            TokenInvalidReason::Malformed
        })?;

        // 2. Key resolution
        let kid = kid.map_err(|_| {
            tracing::debug!(target: "api.auth.jwt", "Token has no kid");
            TokenInvalidReason::UnknownKeyId
        })?;

        let key = keys.get(&kid).ok_or_else(|| {
            tracing::debug!(target: "api.auth.jwt", kid = %kid, "Key id not in key set");
            TokenInvalidReason::UnknownKeyId
        })?;

        if header.alg != key.algorithm() {
            tracing::debug!(
                target: "api.auth.jwt",
                kid = %kid,
                token_alg = ?header.alg,
                key_alg = ?key.algorithm(),
                "Token algorithm does not match key"
            );
            return Err(TokenInvalidReason::SignatureMismatch.into());
        }

        // 3. Signature only; claim checks below
        let mut validation = Validation::new(key.algorithm());
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = decode::<RawClaims>(token, key.decoding_key(), &validation)
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::InvalidSignature
                    | ErrorKind::InvalidAlgorithm
                    | ErrorKind::InvalidEcdsaKey
                    | ErrorKind::InvalidRsaKey(_)
                    | ErrorKind::InvalidKeyFormat => TokenInvalidReason::SignatureMismatch,
                    _ => TokenInvalidReason::Malformed,
                };
                tracing::debug!(target: "api.auth.jwt", kid = %kid, error = %e, "Token verification failed");
                reason
            })?
            .claims;

        // 4. Issuer and audience
        let issuer: String = required(&claims, "iss", ClaimKind::String)?;
        if issuer != self.expected.issuer {
            tracing::debug!(target: "api.auth.jwt", issuer = %issuer, "Issuer mismatch");
            return Err(TokenInvalidReason::IssuerMismatch.into());
        }

        let audience = Audience::from_claims(&claims)?;
        if !audience.contains(&self.expected.audience) {
            tracing::debug!(target: "api.auth.jwt", audience = ?audience, "Audience mismatch");
            return Err(TokenInvalidReason::AudienceMismatch.into());
        }

        // 5. Time checks with clock skew tolerance
        let exp = NumericDate::from_claims(&claims, "exp")?.seconds();
        validate_exp_at(exp, self.clock_skew, now).map_err(|_| TokenInvalidReason::Expired)?;

        if let Some(nbf) = claims
            .get("nbf")
            .and_then(|value| NumericDate::deserialize(value).ok())
        {
            validate_nbf_at(nbf.seconds(), self.clock_skew, now)
                .map_err(|_| TokenInvalidReason::NotYetValid)?;
        }

        let iat = NumericDate::from_claims(&claims, "iat")?.seconds();
        validate_iat_at(iat, self.clock_skew, now).map_err(|_| TokenInvalidReason::NotYetValid)?;

        tracing::debug!(target: "api.auth.jwt", kid = %kid, "Token validated successfully");
        Ok(claims)
    }
}
