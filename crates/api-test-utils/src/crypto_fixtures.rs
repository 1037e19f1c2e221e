//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs that sign JWTs and publish
//! themselves as JWKs. All fixtures are deterministic based on seed values.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{json, Value};

/// Ed25519 keypair for signing test tokens.
///
/// # Example
/// ```rust,ignore
/// let keypair = TestKeypair::new(1, "key-1");
/// let token = keypair.sign(&TestTokenBuilder::new().build());
/// let jwks = jwks_json(&[&keypair]);
/// ```
pub struct TestKeypair {
    kid: String,
    public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// Create a keypair from a seed. The same seed always produces the same key.
    pub fn new(seed: u8, kid: &str) -> Self {
        let seed_bytes = seed_bytes(seed);

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .expect("Failed to create test keypair");

        Self {
            kid: kid.to_string(),
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    /// Key ID published in the JWK and set in token headers.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Sign claims as an EdDSA JWT with this key's `kid`.
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Sign claims with a header that carries no `kid`.
    pub fn sign_without_kid(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        self.sign_with_header(&header, claims)
    }

    /// Sign claims with a caller-supplied header.
    pub fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        encode(header, claims, &encoding_key).expect("Failed to sign token")
    }

    /// Public key as a JWK.
    pub fn jwk_json(&self) -> Value {
        json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key_bytes),
            "alg": "EdDSA",
            "use": "sig"
        })
    }
}

/// JWKS document publishing the given keypairs.
pub fn jwks_json(keypairs: &[&TestKeypair]) -> Value {
    json!({
        "keys": keypairs.iter().map(|keypair| keypair.jwk_json()).collect::<Vec<_>>()
    })
}

/// Deterministic 32-byte seed derived from a single byte.
fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// This is a test-only utility; ring does not export PKCS#8 for seeded keys.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    // PKCS#8 v1 (RFC 5208):
    // SEQUENCE { version INTEGER (0), AlgorithmIdentifier, privateKey OCTET STRING }
    // where privateKey wraps an OCTET STRING holding the 32-byte seed.
    let mut pkcs8 = Vec::with_capacity(48);

    // Outer SEQUENCE, 46 bytes
    pkcs8.extend_from_slice(&[0x30, 0x2e]);

    // Version: INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);

    // AlgorithmIdentifier: SEQUENCE { OID 1.3.101.112 }
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);

    // Private key: OCTET STRING { OCTET STRING (32 bytes) }
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}
