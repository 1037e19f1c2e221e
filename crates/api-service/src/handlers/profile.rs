//! Handlers for authenticated user endpoints.
//!
//! Both run behind `require_auth` and read the `Identity` it injected.

use crate::auth::Identity;
use crate::models::{ProfileData, ProfileResponse, VerifiedUser, VerifyResponse};
use axum::{Extension, Json};
use tracing::instrument;

/// Handler for GET /api/v1/profile
///
/// Returns the profile claims of the authenticated user:
///
/// ```json
/// {
///   "message": "Profile retrieved successfully",
///   "data": {"sub": "u1", "email": "u1@example.com", "emailVerified": true, ...}
/// }
/// ```
#[instrument(skip_all, name = "api.handlers.profile")]
pub async fn get_profile(Extension(identity): Extension<Identity>) -> Json<ProfileResponse> {
    tracing::debug!(target: "api.handlers.profile", "Returning profile");

    Json(ProfileResponse {
        message: "Profile retrieved successfully",
        data: ProfileData::from(identity),
    })
}

/// Handler for GET /api/v1/auth/verify
#[instrument(skip_all, name = "api.handlers.verify")]
pub async fn verify_auth(Extension(identity): Extension<Identity>) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        status: "success",
        message: "Token is valid",
        user: VerifiedUser::from(identity),
    })
}
