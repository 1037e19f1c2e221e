//! Mock JWKS endpoint backed by wiremock.
//!
//! Each `serve_*` call replaces whatever the endpoint served before and
//! resets the request journal, so fetch counts are per phase.

use crate::crypto_fixtures::{jwks_json, TestKeypair};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves the key set on.
pub const JWKS_PATH: &str = "/api/auth/jwks";

/// Identity-provider stand-in serving a JWKS document.
pub struct MockJwks {
    server: MockServer,
}

impl MockJwks {
    /// Start a mock server with nothing mounted (every request is a 404).
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full URL of the JWKS endpoint.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Serve a JWKS document publishing `keypairs`.
    pub async fn serve_keys(&self, keypairs: &[&TestKeypair]) {
        self.serve(ResponseTemplate::new(200).set_body_json(jwks_json(keypairs)))
            .await;
    }

    /// Serve a JWKS document after `delay`.
    pub async fn serve_keys_delayed(&self, keypairs: &[&TestKeypair], delay: Duration) {
        self.serve(
            ResponseTemplate::new(200)
                .set_body_json(jwks_json(keypairs))
                .set_delay(delay),
        )
        .await;
    }

    /// Respond with a bare status code.
    pub async fn serve_status(&self, status: u16) {
        self.serve(ResponseTemplate::new(status)).await;
    }

    /// Respond 200 with a raw body.
    pub async fn serve_raw(&self, body: &str) {
        self.serve(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string(body),
        )
        .await;
    }

    /// Number of JWKS requests received since the last `serve_*` call.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }

    async fn serve(&self, response: ResponseTemplate) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }
}
