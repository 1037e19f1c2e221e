//! Test server harness for E2E testing
//!
//! Provides `TestApiServer` for spawning real API server instances in tests,
//! wired to a `MockJwks` identity provider.

use crate::crypto_fixtures::TestKeypair;
use crate::jwks_mock::MockJwks;
use crate::token_builders::{TEST_AUDIENCE, TEST_ISSUER};
use api_service::auth::{HttpJwksFetcher, KeyCache};
use api_service::config::Config;
use api_service::routes::{self, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the API server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_flow_e2e() -> Result<()> {
///     let server = TestApiServer::spawn().await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestApiServer {
    addr: SocketAddr,
    config: Config,
    key_cache: KeyCache,
    jwks: MockJwks,
    keypair: TestKeypair,
    _handle: JoinHandle<()>,
}

impl TestApiServer {
    /// Spawn a server whose identity provider publishes one signing key.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(&[]).await
    }

    /// Spawn with extra configuration variables (e.g. `JWKS_CACHE_TTL_SECONDS`).
    pub async fn spawn_with_vars(vars: &[(&str, &str)]) -> Result<Self, anyhow::Error> {
        let jwks = MockJwks::start().await;
        let keypair = TestKeypair::new(1, "test-key-1");
        jwks.serve_keys(&[&keypair]).await;
        Self::spawn_against(jwks, keypair, vars).await
    }

    /// Spawn against a mock the caller has already configured.
    ///
    /// The server warms its key cache before returning, exactly like the
    /// binary does at start-up; a failing mock leaves the cache empty.
    pub async fn spawn_against(
        jwks: MockJwks,
        keypair: TestKeypair,
        vars: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let mut config_vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("AUTH_JWKS_URL".to_string(), jwks.jwks_url()),
            ("AUTH_ISSUER".to_string(), TEST_ISSUER.to_string()),
            ("AUTH_AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
        ]);
        for (name, value) in vars {
            config_vars.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&config_vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let fetcher = HttpJwksFetcher::new(config.jwks_url.clone(), config.jwks_fetch_timeout());
        let key_cache = KeyCache::new(Arc::new(fetcher), config.jwks_cache_ttl());
        key_cache.warm().await;

        // Handle to a recorder that is never installed globally
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let state = Arc::new(AppState {
            config: config.clone(),
            key_cache: key_cache.clone(),
        });
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            key_cache,
            jwks,
            keypair,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The server's key cache.
    pub fn key_cache(&self) -> &KeyCache {
        &self.key_cache
    }

    /// The mock identity provider.
    pub fn jwks(&self) -> &MockJwks {
        &self.jwks
    }

    /// The key the mock identity provider publishes by default.
    pub fn keypair(&self) -> &TestKeypair {
        &self.keypair
    }
}

impl Drop for TestApiServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let server = TestApiServer::spawn().await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));
        assert!(server.key_cache().has_keys().await);

        let response = reqwest::get(format!("{}/health", server.url())).await?;
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await?, "OK");

        Ok(())
    }

    #[tokio::test]
    async fn test_server_config_points_at_mock() -> Result<(), anyhow::Error> {
        let server = TestApiServer::spawn_with_vars(&[("JWKS_CACHE_TTL_SECONDS", "5")]).await?;

        assert_eq!(server.config().jwks_url, server.jwks().jwks_url());
        assert_eq!(server.config().jwks_cache_ttl_seconds, 5);
        assert_eq!(server.config().issuer, TEST_ISSUER);

        let expected_url = format!("http://{}", server.addr());
        assert_eq!(server.url(), expected_url);

        Ok(())
    }
}
