//! API service error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl.
//! Bodies have the shape `{"error": string, "message": string}`. Messages
//! returned to clients are intentionally generic; details are logged
//! server-side.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Realm advertised in `WWW-Authenticate` challenges.
pub const AUTH_REALM: &str = "gatehouse";

/// API service error type.
///
/// Maps to HTTP status codes:
/// - MissingCredentials, InvalidToken: 401 Unauthorized
/// - NotFound: 404 Not Found
/// - KeysUnavailable, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Authentication keys unavailable")]
    KeysUnavailable,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingCredentials(_) | ApiError::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::KeysUnavailable | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error, message, challenge) = match self {
            ApiError::MissingCredentials(message) => (
                "Unauthorized",
                message,
                Some(format!("Bearer realm=\"{AUTH_REALM}\"")),
            ),
            ApiError::InvalidToken(message) => (
                "Unauthorized",
                message,
                Some(format!(
                    "Bearer realm=\"{AUTH_REALM}\", error=\"invalid_token\""
                )),
            ),
            ApiError::KeysUnavailable => {
                tracing::warn!(target: "api.availability", "Authentication keys unavailable");
                (
                    "Internal Server Error",
                    "Failed to refresh authentication keys".to_string(),
                    None,
                )
            }
            ApiError::NotFound(resource) => ("Not Found", resource, None),
            ApiError::Internal => (
                "Internal Server Error",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let mut response = (status, Json(ErrorResponse { error, message })).into_response();

        if let Some(challenge) = challenge {
            if let Ok(header_value) = HeaderValue::from_str(&challenge) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, header_value);
            }
        }

        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    // Helper function to read the response body as JSON
    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display_invalid_token() {
        let error = ApiError::InvalidToken("expired".to_string());
        assert_eq!(format!("{}", error), "Invalid token: expired");
    }

    #[test]
    fn test_display_keys_unavailable() {
        assert_eq!(
            format!("{}", ApiError::KeysUnavailable),
            "Authentication keys unavailable"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::MissingCredentials(String::new()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::InvalidToken(String::new()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::NotFound(String::new()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::KeysUnavailable.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Internal.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_invalid_token_response() {
        let response =
            ApiError::InvalidToken("The access token is expired".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer realm=\"gatehouse\", error=\"invalid_token\""
        );

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"], "Unauthorized");
        assert_eq!(body["message"], "The access token is expired");
    }

    #[tokio::test]
    async fn test_missing_credentials_challenge_has_no_error_code() {
        let response =
            ApiError::MissingCredentials("Authorization header is required".to_string())
                .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer realm=\"gatehouse\""
        );
    }

    #[tokio::test]
    async fn test_keys_unavailable_response() {
        let response = ApiError::KeysUnavailable.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"], "Internal Server Error");
        assert_eq!(body["message"], "Failed to refresh authentication keys");
    }

    #[tokio::test]
    async fn test_not_found_response() {
        let response = ApiError::NotFound("Route not found".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"], "Not Found");
        assert_eq!(body["message"], "Route not found");
    }
}
