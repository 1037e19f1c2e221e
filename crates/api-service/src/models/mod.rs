//! API service response models.

use crate::auth::claims::ProfileTimestamp;
use crate::auth::Identity;
use serde::Serialize;

/// Readiness check response.
///
/// Returned by the `/ready` endpoint (readiness check).
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Service readiness status ("ready" or "not_ready").
    pub status: &'static str,

    /// Signing key availability ("available" or "unavailable").
    pub jwks: &'static str,

    /// Number of cached verification keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys_cached: Option<usize>,

    /// Error message (generic, no infrastructure details).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response for `GET /api/v1/profile`.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileResponse {
    pub message: &'static str,
    pub data: ProfileData,
}

/// Profile of the authenticated user as carried by the token.
///
/// Absent optional claims serialize as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileData {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "emailVerified")]
    pub email_verified: Option<bool>,
    pub image: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<ProfileTimestamp>,
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<ProfileTimestamp>,
    pub issuer: String,
    pub audience: String,
    pub expires_at: i64,
    pub issued_at: i64,
}

impl From<Identity> for ProfileData {
    fn from(identity: Identity) -> Self {
        Self {
            sub: identity.subject,
            email: identity.email,
            name: identity.name,
            email_verified: identity.email_verified,
            image: identity.image,
            created_at: identity.created_at,
            updated_at: identity.updated_at,
            issuer: identity.issuer,
            audience: identity.audience,
            expires_at: identity.expires_at,
            issued_at: identity.issued_at,
        }
    }
}

/// Response for `GET /api/v1/auth/verify`.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub user: VerifiedUser,
}

/// Minimal user view returned by the verify endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedUser {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl From<Identity> for VerifiedUser {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.subject,
            email: identity.email,
            name: identity.name,
        }
    }
}
