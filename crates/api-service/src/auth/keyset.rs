//! JSON Web Key parsing and the immutable key set built from a JWKS document.
//!
//! A `KeySet` is built once per successful fetch and never mutated. The key
//! cache swaps whole sets behind an `Arc`, so readers always see a complete
//! set.
//!
//! # Supported keys
//!
//! | `kty` | `crv`   | algorithms                       |
//! |-------|---------|----------------------------------|
//! | RSA   | -       | RS256/384/512, PS256/384/512     |
//! | EC    | P-256   | ES256                            |
//! | EC    | P-384   | ES384                            |
//! | OKP   | Ed25519 | EdDSA                            |
//!
//! Keys marked `"use": "enc"`, keys without a `kid`, symmetric keys and
//! anything else unsupported are skipped rather than failing the document.

use crate::auth::jwks::KeyFetchError;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// JSON Web Key as published by the identity provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC", "OKP").
    #[serde(default)]
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is intended for.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" or "enc").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Curve name for EC and OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,
}

/// JWKS document (`{"keys": [...]}`).
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Reasons a single JWK cannot be used for signature verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JwkError {
    #[error("JWK has no kid")]
    MissingKid,

    #[error("JWK is an encryption key")]
    EncryptionKey,

    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Unsupported curve: {0}")]
    UnsupportedCurve(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Algorithm {alg} does not match key type {kty}")]
    AlgorithmMismatch { alg: String, kty: String },

    #[error("JWK missing required member: {0}")]
    MissingComponent(&'static str),

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),
}

/// A verification key resolved from a JWK.
#[derive(Clone)]
pub struct VerificationKey {
    kid: String,
    algorithm: Algorithm,
    decoding_key: DecodingKey,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// Build a verification key from a JWK.
    ///
    /// # Errors
    ///
    /// Returns a `JwkError` describing why the key is unusable.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, JwkError> {
        let kid = jwk
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or(JwkError::MissingKid)?
            .to_string();

        if jwk.key_use.as_deref() == Some("enc") {
            return Err(JwkError::EncryptionKey);
        }

        let algorithm = resolve_algorithm(jwk)?;

        let decoding_key = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref().ok_or(JwkError::MissingComponent("n"))?;
                let e = jwk.e.as_deref().ok_or(JwkError::MissingComponent("e"))?;
                DecodingKey::from_rsa_components(n, e)
            }
            "EC" => {
                let x = jwk.x.as_deref().ok_or(JwkError::MissingComponent("x"))?;
                let y = jwk.y.as_deref().ok_or(JwkError::MissingComponent("y"))?;
                DecodingKey::from_ec_components(x, y)
            }
            "OKP" => {
                let x = jwk.x.as_deref().ok_or(JwkError::MissingComponent("x"))?;
                DecodingKey::from_ed_components(x)
            }
            other => return Err(JwkError::UnsupportedKeyType(other.to_string())),
        }
        .map_err(|e| JwkError::InvalidKeyMaterial(e.to_string()))?;

        Ok(Self {
            kid,
            algorithm,
            decoding_key,
        })
    }

    /// Key ID.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The only algorithm tokens signed by this key may use.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Key material for `jsonwebtoken::decode`.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Determine the algorithm for a JWK, from `alg` when present or from the
/// key type and curve otherwise, and check that the two agree.
fn resolve_algorithm(jwk: &Jwk) -> Result<Algorithm, JwkError> {
    let inferred = match jwk.kty.as_str() {
        "RSA" => Algorithm::RS256,
        "EC" => match jwk.crv.as_deref() {
            Some("P-256") => Algorithm::ES256,
            Some("P-384") => Algorithm::ES384,
            Some(other) => return Err(JwkError::UnsupportedCurve(other.to_string())),
            None => return Err(JwkError::MissingComponent("crv")),
        },
        "OKP" => match jwk.crv.as_deref() {
            Some("Ed25519") => Algorithm::EdDSA,
            Some(other) => return Err(JwkError::UnsupportedCurve(other.to_string())),
            None => return Err(JwkError::MissingComponent("crv")),
        },
        other => return Err(JwkError::UnsupportedKeyType(other.to_string())),
    };

    let Some(alg) = jwk.alg.as_deref() else {
        return Ok(inferred);
    };

    let declared = Algorithm::from_str(alg)
        .map_err(|_| JwkError::UnsupportedAlgorithm(alg.to_string()))?;

    let compatible = match jwk.kty.as_str() {
        "RSA" => matches!(
            declared,
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
        ),
        // EC and OKP: the curve fixes the algorithm
        _ => declared == inferred,
    };

    if !compatible {
        return Err(JwkError::AlgorithmMismatch {
            alg: alg.to_string(),
            kty: jwk.kty.clone(),
        });
    }

    Ok(declared)
}

/// Immutable set of verification keys indexed by key ID.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, VerificationKey>,
}

impl KeySet {
    /// Build a key set from already-resolved keys. The first key wins on
    /// duplicate kids.
    pub fn new(keys: impl IntoIterator<Item = VerificationKey>) -> Self {
        let mut map = HashMap::new();
        for key in keys {
            if map.contains_key(&key.kid) {
                tracing::debug!(
                    target: "api.auth.keyset",
                    kid = %key.kid,
                    "Duplicate kid in JWKS, keeping first"
                );
                continue;
            }
            map.insert(key.kid.clone(), key);
        }
        Self { keys: map }
    }

    /// Build a key set from a JWKS document, skipping unusable keys.
    ///
    /// # Errors
    ///
    /// Returns `KeyFetchError::NoUsableKeys` if no key in the document can be
    /// used for signature verification.
    pub fn from_document(document: &JwksDocument) -> Result<Self, KeyFetchError> {
        let usable = document.keys.iter().filter_map(|jwk| {
            VerificationKey::from_jwk(jwk)
                .map_err(|e| {
                    tracing::debug!(
                        target: "api.auth.keyset",
                        kid = ?jwk.kid,
                        kty = %jwk.kty,
                        reason = %e,
                        "Skipping unusable JWK"
                    );
                })
                .ok()
        });
        let keyset = Self::new(usable);

        if keyset.is_empty() {
            tracing::warn!(
                target: "api.auth.keyset",
                published = document.keys.len(),
                "JWKS document contains no usable signing keys"
            );
            return Err(KeyFetchError::NoUsableKeys);
        }

        Ok(keyset)
    }

    /// Look up a key by ID.
    pub fn get(&self, kid: &str) -> Option<&VerificationKey> {
        self.keys.get(kid)
    }

    /// Number of keys in the set.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key IDs, sorted.
    pub fn kids(&self) -> Vec<&str> {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        kids
    }
}
