//! Builder patterns for test data construction
//!
//! Provides a fluent API for JWT claim sets.

use chrono::Utc;
use serde_json::{json, Map, Value};

/// Issuer expected by the test server.
pub const TEST_ISSUER: &str = "https://issuer.example";

/// Audience expected by the test server.
pub const TEST_AUDIENCE: &str = "api";

/// Builder for creating test JWT claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_user("alice")
///     .for_audiences(&["other", "api"])
///     .expires_in(60)
///     .build();
/// ```
pub struct TestTokenBuilder {
    now: i64,
    sub: String,
    iss: String,
    aud: Value,
    exp: i64,
    iat: i64,
    nbf: Option<i64>,
    overrides: Map<String, Value>,
    removed: Vec<String>,
}

impl TestTokenBuilder {
    /// Create a new token builder valid for one hour from the current time.
    pub fn new() -> Self {
        Self::at(Utc::now().timestamp())
    }

    /// Create a new token builder relative to a fixed `now`.
    pub fn at(now: i64) -> Self {
        Self {
            now,
            sub: "test-subject".to_string(),
            iss: TEST_ISSUER.to_string(),
            aud: json!(TEST_AUDIENCE),
            exp: now + 3600,
            iat: now,
            nbf: None,
            overrides: Map::new(),
            removed: Vec::new(),
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the issuer
    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    /// Set `aud` to a single string
    pub fn for_audience(mut self, audience: &str) -> Self {
        self.aud = json!(audience);
        self
    }

    /// Set `aud` to an array
    pub fn for_audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = json!(audiences);
        self
    }

    /// Set expiration in seconds relative to `now`
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = self.now + seconds;
        self
    }

    /// Set expiration timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = timestamp;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Set not-before timestamp
    pub fn not_before(mut self, timestamp: i64) -> Self {
        self.nbf = Some(timestamp);
        self
    }

    /// Set an arbitrary claim, replacing any standard value
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.overrides.insert(name.to_string(), value);
        self
    }

    /// Drop a claim from the output
    pub fn without_claim(mut self, name: &str) -> Self {
        self.removed.push(name.to_string());
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("iss".to_string(), json!(self.iss));
        claims.insert("aud".to_string(), self.aud);
        claims.insert("exp".to_string(), json!(self.exp));
        claims.insert("iat".to_string(), json!(self.iat));
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }

        claims.extend(self.overrides);
        for name in &self.removed {
            claims.remove(name);
        }

        Value::Object(claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let claims = TestTokenBuilder::at(1_000).build();

        assert_eq!(claims["sub"], "test-subject");
        assert_eq!(claims["iss"], TEST_ISSUER);
        assert_eq!(claims["aud"], TEST_AUDIENCE);
        assert_eq!(claims["exp"], 4_600);
        assert_eq!(claims["iat"], 1_000);
        assert!(claims.get("nbf").is_none());
    }

    #[test]
    fn test_builder_overrides_and_removals() {
        let claims = TestTokenBuilder::at(1_000)
            .for_user("alice")
            .for_audiences(&["other", "api"])
            .with_claim("email", json!("alice@example.com"))
            .with_claim("iat", json!(999.5))
            .without_claim("iss")
            .build();

        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["aud"], json!(["other", "api"]));
        assert_eq!(claims["email"], "alice@example.com");
        assert_eq!(claims["iat"], json!(999.5));
        assert!(claims.get("iss").is_none());
    }
}
