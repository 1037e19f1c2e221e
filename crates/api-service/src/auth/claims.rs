//! Claims normalization.
//!
//! Verified JWT payloads arrive as a loose JSON object whose shape differs
//! between issuers (`aud` as string or array, timestamps as integers or
//! floats, camelCase or snake_case profile claims). This module decodes each
//! claim once into an explicit type and produces an `Identity`.
//!
//! A required claim that is missing or has the wrong JSON type is a
//! `ClaimShapeError`. An optional claim with the wrong type is treated as
//! absent. Values are never coerced between JSON types.
//!
//! The `subject` and `email` fields are redacted in Debug output.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Verified but not yet normalized claims.
pub type RawClaims = serde_json::Map<String, Value>;

/// The JSON shape a claim was expected to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimKind {
    String,
    StringOrArray,
    NumericDate,
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ClaimKind::String => "string",
            ClaimKind::StringOrArray => "non-empty string or array of strings",
            ClaimKind::NumericDate => "numeric date",
        };
        f.write_str(kind)
    }
}

/// A required claim is missing or has an unaccepted JSON type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("claim `{claim}` is missing or is not a {expected}")]
pub struct ClaimShapeError {
    pub claim: String,
    pub expected: ClaimKind,
}

impl ClaimShapeError {
    pub fn new(claim: &str, expected: ClaimKind) -> Self {
        Self {
            claim: claim.to_string(),
            expected,
        }
    }
}

/// `aud` claim: a single audience or a list of audiences.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// Decode `aud` from claims. An empty list is rejected.
    pub fn from_claims(raw: &RawClaims) -> Result<Self, ClaimShapeError> {
        let audience: Audience = required(raw, "aud", ClaimKind::StringOrArray)?;
        match &audience {
            Audience::Multiple(list) if list.is_empty() => {
                Err(ClaimShapeError::new("aud", ClaimKind::StringOrArray))
            }
            _ => Ok(audience),
        }
    }

    /// Whether `expected` is this audience or one of the listed audiences.
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == expected,
            Audience::Multiple(list) => list.iter().any(|aud| aud == expected),
        }
    }

    /// The first listed audience.
    pub fn first(&self) -> Option<&str> {
        match self {
            Audience::Single(aud) => Some(aud),
            Audience::Multiple(list) => list.first().map(String::as_str),
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        match self {
            Audience::Single(aud) => vec![aud],
            Audience::Multiple(list) => list,
        }
    }
}

/// Seconds since the epoch, encoded as a JSON integer or float.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumericDate {
    Integer(i64),
    Float(f64),
}

impl NumericDate {
    /// Decode a required numeric date claim.
    pub fn from_claims(raw: &RawClaims, claim: &str) -> Result<Self, ClaimShapeError> {
        required(raw, claim, ClaimKind::NumericDate)
    }

    /// Whole seconds; fractional parts are truncated toward zero.
    #[allow(clippy::cast_possible_truncation)]
    pub fn seconds(self) -> i64 {
        match self {
            NumericDate::Integer(secs) => secs,
            // `as` saturates at the i64 bounds
            NumericDate::Float(secs) => secs.trunc() as i64,
        }
    }
}

/// Profile timestamp (`createdAt` / `updatedAt`): issuers send either an
/// ISO-8601 string or a numeric date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProfileTimestamp {
    Text(String),
    Epoch(i64),
}

impl ProfileTimestamp {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(ProfileTimestamp::Text(text.clone())),
            Value::Number(_) => NumericDate::deserialize(value)
                .ok()
                .map(|date| ProfileTimestamp::Epoch(date.seconds())),
            _ => None,
        }
    }
}

/// Decode a required claim, rejecting `null` and mistyped values.
pub(crate) fn required<T: DeserializeOwned>(
    raw: &RawClaims,
    claim: &str,
    expected: ClaimKind,
) -> Result<T, ClaimShapeError> {
    raw.get(claim)
        .filter(|value| !value.is_null())
        .and_then(|value| T::deserialize(value).ok())
        .ok_or_else(|| ClaimShapeError::new(claim, expected))
}

/// Decode an optional claim; anything mistyped is absent.
fn optional<T: DeserializeOwned>(raw: &RawClaims, claim: &str) -> Option<T> {
    raw.get(claim).and_then(|value| T::deserialize(value).ok())
}

/// First correctly typed value among alias claim names.
fn optional_alias<T: DeserializeOwned>(raw: &RawClaims, claims: &[&str]) -> Option<T> {
    claims.iter().find_map(|claim| optional(raw, claim))
}

fn optional_timestamp(raw: &RawClaims, claims: &[&str]) -> Option<ProfileTimestamp> {
    claims
        .iter()
        .find_map(|claim| raw.get(*claim).and_then(ProfileTimestamp::from_value))
}

/// Authenticated identity derived from a verified token.
///
/// Immutable; lives for one request in the request extensions.
#[derive(Clone, PartialEq, Serialize)]
pub struct Identity {
    /// `sub` - redacted in Debug output.
    pub subject: String,
    pub issuer: String,
    /// The audience this service accepted the token for, or the first
    /// listed audience when the normalizer has no accepted audience.
    pub audience: String,
    /// Every audience the token lists, in order.
    pub audiences: Vec<String>,
    pub issued_at: i64,
    pub expires_at: i64,

    /// Redacted in Debug output.
    pub email: Option<String>,
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub email_verified: Option<bool>,
    pub image: Option<String>,
    pub created_at: Option<ProfileTimestamp>,
    pub updated_at: Option<ProfileTimestamp>,

    /// Configured extra claims, copied verbatim when present.
    pub extra: BTreeMap<String, Value>,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("subject", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("audiences", &self.audiences)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("name", &self.name)
            .field("nickname", &self.nickname)
            .field("email_verified", &self.email_verified)
            .field("image", &self.image)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Turns verified claims into an `Identity`.
#[derive(Debug, Clone, Default)]
pub struct ClaimsNormalizer {
    extra_claims: Vec<String>,
    accepted_audience: Option<String>,
}

impl ClaimsNormalizer {
    /// Create a normalizer that also copies the named claims into
    /// `Identity::extra`.
    pub fn new(extra_claims: Vec<String>) -> Self {
        Self {
            extra_claims,
            accepted_audience: None,
        }
    }

    /// Report `audience` as `Identity::audience` whenever the token lists it.
    pub fn with_accepted_audience(mut self, audience: impl Into<String>) -> Self {
        self.accepted_audience = Some(audience.into());
        self
    }

    /// Normalize verified claims.
    ///
    /// # Errors
    ///
    /// Returns `ClaimShapeError` if `sub`, `iss`, `aud`, `exp` or `iat` is
    /// missing or mistyped.
    pub fn normalize(&self, raw: &RawClaims) -> Result<Identity, ClaimShapeError> {
        let subject: String = required(raw, "sub", ClaimKind::String)?;
        let issuer: String = required(raw, "iss", ClaimKind::String)?;
        let audience = Audience::from_claims(raw)?;
        let expires_at = NumericDate::from_claims(raw, "exp")?.seconds();
        let issued_at = NumericDate::from_claims(raw, "iat")?.seconds();

        let reported_audience = match &self.accepted_audience {
            Some(accepted) if audience.contains(accepted) => accepted.clone(),
            _ => audience.first().unwrap_or_default().to_string(),
        };
        let audiences = audience.into_vec();

        let extra = self
            .extra_claims
            .iter()
            .filter_map(|claim| raw.get(claim).map(|value| (claim.clone(), value.clone())))
            .collect();

        Ok(Identity {
            subject,
            issuer,
            audience: reported_audience,
            audiences,
            issued_at,
            expires_at,
            email: optional(raw, "email"),
            name: optional(raw, "name"),
            nickname: optional(raw, "nickname"),
            email_verified: optional_alias(raw, &["emailVerified", "email_verified"]),
            image: optional_alias(raw, &["image", "picture"]),
            created_at: optional_timestamp(raw, &["createdAt", "created_at"]),
            updated_at: optional_timestamp(raw, &["updatedAt", "updated_at"]),
            extra,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawClaims {
        value.as_object().cloned().expect("claims must be a JSON object")
    }

    fn minimal() -> Value {
        json!({
            "sub": "u1",
            "iss": "https://issuer.example",
            "aud": "api",
            "exp": 1_700_000_060,
            "iat": 1_700_000_000
        })
    }

    #[test]
    fn test_normalize_minimal_claims() {
        let identity = ClaimsNormalizer::default()
            .normalize(&raw(minimal()))
            .unwrap();

        assert_eq!(identity.subject, "u1");
        assert_eq!(identity.issuer, "https://issuer.example");
        assert_eq!(identity.audience, "api");
        assert_eq!(identity.audiences, vec!["api"]);
        assert_eq!(identity.expires_at, 1_700_000_060);
        assert_eq!(identity.issued_at, 1_700_000_000);
        assert!(identity.email.is_none());
        assert!(identity.email_verified.is_none());
        assert!(identity.extra.is_empty());
    }

    #[test]
    fn test_audience_array_keeps_all_and_exposes_first() {
        let mut claims = minimal();
        claims["aud"] = json!(["other", "api"]);

        let identity = ClaimsNormalizer::default().normalize(&raw(claims)).unwrap();
        assert_eq!(identity.audience, "other");
        assert_eq!(identity.audiences, vec!["other", "api"]);
    }

    #[test]
    fn test_accepted_audience_reported_from_array() {
        let mut claims = minimal();
        claims["aud"] = json!(["other", "api"]);

        let identity = ClaimsNormalizer::default()
            .with_accepted_audience("api")
            .normalize(&raw(claims))
            .unwrap();
        assert_eq!(identity.audience, "api");
        assert_eq!(identity.audiences, vec!["other", "api"]);
    }

    #[test]
    fn test_accepted_audience_not_listed_falls_back_to_first() {
        let mut claims = minimal();
        claims["aud"] = json!(["other", "third"]);

        let identity = ClaimsNormalizer::default()
            .with_accepted_audience("api")
            .normalize(&raw(claims))
            .unwrap();
        assert_eq!(identity.audience, "other");
    }

    #[test]
    fn test_float_timestamps_truncate() {
        let mut claims = minimal();
        claims["exp"] = json!(1_700_000_060.999);
        claims["iat"] = json!(1_700_000_000.5);

        let identity = ClaimsNormalizer::default().normalize(&raw(claims)).unwrap();
        assert_eq!(identity.expires_at, 1_700_000_060);
        assert_eq!(identity.issued_at, 1_700_000_000);
    }

    #[test]
    fn test_negative_float_truncates_toward_zero() {
        assert_eq!(NumericDate::Float(-1.7).seconds(), -1);
    }

    #[test]
    fn test_missing_required_claims() {
        for claim in ["sub", "iss", "aud", "exp", "iat"] {
            let mut claims = raw(minimal());
            claims.remove(claim);

            let err = ClaimsNormalizer::default().normalize(&claims).unwrap_err();
            assert_eq!(err.claim, claim, "missing {claim}");
        }
    }

    #[test]
    fn test_mistyped_required_claims_are_not_coerced() {
        let cases = [
            ("sub", json!(42), ClaimKind::String),
            ("iss", json!(null), ClaimKind::String),
            ("aud", json!(7), ClaimKind::StringOrArray),
            ("aud", json!(["api", 3]), ClaimKind::StringOrArray),
            ("aud", json!([]), ClaimKind::StringOrArray),
            ("exp", json!("1700000060"), ClaimKind::NumericDate),
            ("iat", json!(true), ClaimKind::NumericDate),
        ];

        for (claim, value, expected) in cases {
            let mut claims = minimal();
            claims[claim] = value.clone();

            let err = ClaimsNormalizer::default()
                .normalize(&raw(claims))
                .unwrap_err();
            assert_eq!(
                err,
                ClaimShapeError::new(claim, expected),
                "{claim} = {value}"
            );
        }
    }

    #[test]
    fn test_optional_profile_claims_copied_when_well_typed() {
        let mut claims = minimal();
        claims["email"] = json!("u1@example.com");
        claims["name"] = json!("User One");
        claims["nickname"] = json!("u1");
        claims["emailVerified"] = json!(true);
        claims["picture"] = json!("https://cdn.example/u1.png");
        claims["createdAt"] = json!("2024-01-01T00:00:00Z");
        claims["updated_at"] = json!(1_700_000_000.25);

        let identity = ClaimsNormalizer::default().normalize(&raw(claims)).unwrap();

        assert_eq!(identity.email.as_deref(), Some("u1@example.com"));
        assert_eq!(identity.name.as_deref(), Some("User One"));
        assert_eq!(identity.nickname.as_deref(), Some("u1"));
        assert_eq!(identity.email_verified, Some(true));
        assert_eq!(identity.image.as_deref(), Some("https://cdn.example/u1.png"));
        assert_eq!(
            identity.created_at,
            Some(ProfileTimestamp::Text("2024-01-01T00:00:00Z".to_string()))
        );
        assert_eq!(
            identity.updated_at,
            Some(ProfileTimestamp::Epoch(1_700_000_000))
        );
    }

    #[test]
    fn test_optional_claims_with_wrong_type_are_absent() {
        let mut claims = minimal();
        claims["email"] = json!(["a@example.com"]);
        claims["name"] = json!(12);
        claims["emailVerified"] = json!("true");
        claims["image"] = json!({"url": "x"});
        claims["createdAt"] = json!(false);

        let identity = ClaimsNormalizer::default().normalize(&raw(claims)).unwrap();

        assert!(identity.email.is_none());
        assert!(identity.name.is_none());
        assert!(identity.email_verified.is_none());
        assert!(identity.image.is_none());
        assert!(identity.created_at.is_none());
    }

    #[test]
    fn test_alias_precedence() {
        let mut claims = minimal();
        claims["image"] = json!("primary.png");
        claims["picture"] = json!("fallback.png");
        claims["emailVerified"] = json!("yes");
        claims["email_verified"] = json!(false);

        let identity = ClaimsNormalizer::default().normalize(&raw(claims)).unwrap();

        assert_eq!(identity.image.as_deref(), Some("primary.png"));
        // Mistyped camelCase falls through to the snake_case alias
        assert_eq!(identity.email_verified, Some(false));
    }

    #[test]
    fn test_extra_claims_copied_verbatim() {
        let mut claims = minimal();
        claims["org_id"] = json!("org-7");
        claims["roles"] = json!(["admin", "viewer"]);
        claims["ignored"] = json!("not configured");

        let normalizer = ClaimsNormalizer::new(vec![
            "org_id".to_string(),
            "roles".to_string(),
            "absent".to_string(),
        ]);
        let identity = normalizer.normalize(&raw(claims)).unwrap();

        assert_eq!(identity.extra.len(), 2);
        assert_eq!(identity.extra["org_id"], json!("org-7"));
        assert_eq!(identity.extra["roles"], json!(["admin", "viewer"]));
    }

    #[test]
    fn test_identity_debug_redacts_subject_and_email() {
        let mut claims = minimal();
        claims["sub"] = json!("secret-user-id");
        claims["email"] = json!("secret@example.com");

        let identity = ClaimsNormalizer::default().normalize(&raw(claims)).unwrap();
        let debug_str = format!("{identity:?}");

        assert!(!debug_str.contains("secret-user-id"));
        assert!(!debug_str.contains("secret@example.com"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_audience_contains() {
        let single = Audience::Single("api".to_string());
        let multiple = Audience::Multiple(vec!["other".to_string(), "api".to_string()]);

        assert!(single.contains("api"));
        assert!(multiple.contains("api"));
        assert!(!single.contains("ap"));
        assert!(!multiple.contains("API"));
        assert_eq!(multiple.first(), Some("other"));
    }
}
