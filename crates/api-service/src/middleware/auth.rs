//! Authentication gate for protected routes.
//!
//! Extracts the bearer token from the Authorization header, validates it
//! against the cached key set, normalizes the claims, and injects the
//! resulting `Identity` into request extensions.
//!
//! Every request produces exactly one `AuthOutcome`. Key infrastructure
//! failures are reported as 500, everything attributable to the client as
//! 401.

use crate::auth::{
    ClaimsNormalizer, Identity, KeyCache, TokenError, TokenInvalidReason, TokenValidator,
};
use crate::errors::ApiError;
use crate::observability::metrics::record_auth_outcome;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

/// Generic client-facing message for token and claim failures.
const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Why a request was not authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    MissingOrMalformedHeader,
    KeysUnavailable,
    Token(TokenInvalidReason),
    ClaimShape,
}

impl AuthErrorKind {
    /// Stable code for logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorKind::MissingOrMalformedHeader => "missing-or-malformed-header",
            AuthErrorKind::KeysUnavailable => "keys-unavailable",
            AuthErrorKind::Token(reason) => reason.as_str(),
            AuthErrorKind::ClaimShape => "claim-shape",
        }
    }
}

/// A rejected authentication attempt. `detail` is for logs only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: AuthErrorKind,
    pub detail: String,
}

impl Rejection {
    fn new(kind: AuthErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        match rejection.kind {
            AuthErrorKind::MissingOrMalformedHeader => ApiError::MissingCredentials(rejection.detail),
            AuthErrorKind::KeysUnavailable => ApiError::KeysUnavailable,
            AuthErrorKind::Token(_) | AuthErrorKind::ClaimShape => {
                ApiError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string())
            }
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Result of authenticating one request.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Authenticated(Identity),
    Rejected(Rejection),
}

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub key_cache: KeyCache,
    pub validator: Arc<TokenValidator>,
    pub normalizer: Arc<ClaimsNormalizer>,
}

impl AuthState {
    pub fn new(key_cache: KeyCache, validator: TokenValidator, normalizer: ClaimsNormalizer) -> Self {
        Self {
            key_cache,
            validator: Arc::new(validator),
            normalizer: Arc::new(normalizer),
        }
    }

    /// Authenticate a request from its headers.
    pub async fn authenticate(&self, headers: &HeaderMap) -> AuthOutcome {
        let outcome = match self.try_authenticate(headers).await {
            Ok(identity) => AuthOutcome::Authenticated(identity),
            Err(rejection) => {
                tracing::debug!(
                    target: "api.middleware.auth",
                    kind = rejection.kind.as_str(),
                    detail = %rejection.detail,
                    "Request rejected"
                );
                AuthOutcome::Rejected(rejection)
            }
        };

        record_auth_outcome(match &outcome {
            AuthOutcome::Authenticated(_) => "authenticated",
            AuthOutcome::Rejected(rejection) => rejection.kind.as_str(),
        });

        outcome
    }

    async fn try_authenticate(&self, headers: &HeaderMap) -> Result<Identity, Rejection> {
        let token = extract_bearer_token(headers)?;

        let keys = self
            .key_cache
            .get_keys()
            .await
            .map_err(|e| Rejection::new(AuthErrorKind::KeysUnavailable, e.to_string()))?;

        let claims = self.validator.validate(token, &keys).map_err(|e| match e {
            TokenError::Invalid(reason) => Rejection::new(AuthErrorKind::Token(reason), e.to_string()),
            TokenError::ClaimShape(shape) => {
                Rejection::new(AuthErrorKind::ClaimShape, shape.to_string())
            }
        })?;

        self.normalizer
            .normalize(&claims)
            .map_err(|e| Rejection::new(AuthErrorKind::ClaimShape, e.to_string()))
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is case-sensitive, separated by exactly one space, and the
/// token must be non-empty with no whitespace.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, Rejection> {
    let value = headers.get(header::AUTHORIZATION).ok_or_else(|| {
        Rejection::new(
            AuthErrorKind::MissingOrMalformedHeader,
            "Authorization header is required",
        )
    })?;

    let malformed = || {
        Rejection::new(
            AuthErrorKind::MissingOrMalformedHeader,
            "Authorization header must be in format 'Bearer <token>'",
        )
    };

    let token = value
        .to_str()
        .map_err(|_| malformed())?
        .strip_prefix("Bearer ")
        .ok_or_else(malformed)?;

    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return Err(malformed());
    }

    Ok(token)
}

/// Authentication middleware that validates bearer tokens.
///
/// # Response
///
/// - 401 Unauthorized with `WWW-Authenticate` if the header or token is bad
/// - 500 Internal Server Error if no signing keys can be obtained
/// - Otherwise runs the next handler once, with `Identity` in extensions
#[instrument(skip_all, name = "api.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Rejection> {
    match state.authenticate(req.headers()).await {
        AuthOutcome::Authenticated(identity) => {
            req.extensions_mut().insert(identity);
            Ok(next.run(req).await)
        }
        AuthOutcome::Rejected(rejection) => Err(rejection),
    }
}

/// Extension trait for reading the authenticated identity from a request.
pub trait IdentityExt {
    /// Returns `None` if the auth middleware did not run for this request.
    fn identity(&self) -> Option<&Identity>;
}

impl<B> IdentityExt for axum::http::Request<B> {
    fn identity(&self) -> Option<&Identity> {
        self.extensions().get::<Identity>()
    }
}

/// The authenticated identity of a request, if any.
pub fn get_identity<B>(req: &axum::http::Request<B>) -> Option<Identity> {
    req.identity().cloned()
}
