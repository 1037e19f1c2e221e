//! Key cache for the identity provider's signing keys.
//!
//! Holds the current `KeySet` behind an `Arc` and refreshes it from a
//! `JwksFetcher` once the TTL has elapsed.
//!
//! # Refresh discipline
//!
//! - Fresh keys are served from a read lock without touching the refresh path
//! - Stale callers queue on a single refresh mutex; whoever gets it first
//!   fetches, everyone queued behind it reuses that attempt's outcome
//! - The fetch runs on its own task holding the refresh mutex, so a caller
//!   that is cancelled mid-refresh does not abandon the fetch for the others
//! - A failed refresh serves the stale set when one exists and fails only
//!   when nothing has ever been fetched
//! - After a failed refresh, callers holding stale keys skip the fetch until
//!   the retry backoff has passed; an empty cache always retries
//! - The swap replaces the `Arc<KeySet>` and timestamp under one write lock

use crate::auth::jwks::{JwksFetcher, KeyFetchError};
use crate::auth::keyset::KeySet;
use crate::observability::metrics::{record_jwks_refresh, set_jwks_keys_cached};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;
use tracing::instrument;

/// Default key cache TTL (24 hours).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default wait after a failed refresh before stale keys trigger another fetch.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(10);

struct CachedKeys {
    keys: Arc<KeySet>,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    current: Option<CachedKeys>,

    /// Completed refresh attempts. Waiters compare it against the value they
    /// saw before queueing to detect a refresh that finished meanwhile.
    attempts: u64,

    last_error: Option<KeyFetchError>,

    /// When the most recent refresh failed; cleared on success.
    failed_at: Option<Instant>,
}

impl CacheState {
    fn fresh(&self, ttl: Duration) -> Option<Arc<KeySet>> {
        self.current
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < ttl)
            .map(|cached| Arc::clone(&cached.keys))
    }

    fn stale(&self) -> Option<Arc<KeySet>> {
        self.current.as_ref().map(|cached| Arc::clone(&cached.keys))
    }

    /// Stale keys to serve without fetching while a recent failure is
    /// within the backoff window.
    fn backing_off(&self, backoff: Duration) -> Option<Arc<KeySet>> {
        self.failed_at
            .filter(|failed_at| failed_at.elapsed() < backoff)
            .and_then(|_| self.stale())
    }
}

struct Inner {
    fetcher: Arc<dyn JwksFetcher>,
    ttl: Duration,
    retry_backoff: Duration,
    state: RwLock<CacheState>,
    refresh_lock: Arc<Mutex<()>>,
}

/// Read-through cache of verification keys with single-flight refresh.
///
/// Cloning is cheap; clones share the same cache.
#[derive(Clone)]
pub struct KeyCache {
    inner: Arc<Inner>,
}

impl KeyCache {
    /// Create an empty cache.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Source of key sets
    /// * `ttl` - How long a fetched key set is considered fresh
    pub fn new(fetcher: Arc<dyn JwksFetcher>, ttl: Duration) -> Self {
        Self::with_retry_backoff(fetcher, ttl, DEFAULT_RETRY_BACKOFF)
    }

    /// Create an empty cache with a custom wait between failed refreshes.
    pub fn with_retry_backoff(
        fetcher: Arc<dyn JwksFetcher>,
        ttl: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                ttl,
                retry_backoff,
                state: RwLock::new(CacheState::default()),
                refresh_lock: Arc::new(Mutex::new(())),
            }),
        }
    }

    /// Get the current key set, refreshing it first if it is stale.
    ///
    /// # Errors
    ///
    /// Returns `KeyFetchError` only when the refresh failed and no key set
    /// (fresh or stale) has ever been cached.
    #[instrument(skip(self), name = "api.auth.key_cache.get_keys")]
    pub async fn get_keys(&self) -> Result<Arc<KeySet>, KeyFetchError> {
        let observed_attempts = {
            let state = self.inner.state.read().await;
            if let Some(keys) = state.fresh(self.inner.ttl) {
                return Ok(keys);
            }
            if let Some(keys) = state.backing_off(self.inner.retry_backoff) {
                return Ok(keys);
            }
            state.attempts
        };

        let guard = Arc::clone(&self.inner.refresh_lock).lock_owned().await;

        {
            let state = self.inner.state.read().await;
            if let Some(keys) = state.fresh(self.inner.ttl) {
                tracing::debug!(target: "api.auth.key_cache", "Keys refreshed while waiting");
                return Ok(keys);
            }
            if state.attempts != observed_attempts {
                // A refresh failed while we waited: share its outcome instead
                // of fetching again.
                return match (state.stale(), &state.last_error) {
                    (Some(keys), _) => Ok(keys),
                    (None, Some(e)) => Err(e.clone()),
                    (None, None) => Err(KeyFetchError::RefreshAborted),
                };
            }
        }

        match self.spawn_refresh(guard).await {
            Ok(keys) => Ok(keys),
            Err(e) => {
                let state = self.inner.state.read().await;
                match state.stale() {
                    Some(keys) => {
                        tracing::warn!(
                            target: "api.auth.key_cache",
                            error = %e,
                            key_count = keys.len(),
                            "JWKS refresh failed, serving stale keys"
                        );
                        Ok(keys)
                    }
                    None => {
                        tracing::error!(
                            target: "api.auth.key_cache",
                            error = %e,
                            "JWKS refresh failed and no keys are cached"
                        );
                        Err(e)
                    }
                }
            }
        }
    }

    /// Fetch a new key set regardless of freshness.
    ///
    /// On failure the previously cached set, if any, stays in place.
    ///
    /// # Errors
    ///
    /// Returns the fetch error even when stale keys remain available.
    pub async fn force_refresh(&self) -> Result<usize, KeyFetchError> {
        let guard = Arc::clone(&self.inner.refresh_lock).lock_owned().await;
        let keys = self.spawn_refresh(guard).await?;
        Ok(keys.len())
    }

    /// Populate the cache at start-up. Failure is logged, not fatal: the
    /// first request will try again.
    pub async fn warm(&self) -> bool {
        match self.force_refresh().await {
            Ok(key_count) => {
                tracing::info!(target: "api.auth.key_cache", key_count, "Key cache warmed");
                true
            }
            Err(e) => {
                tracing::warn!(
                    target: "api.auth.key_cache",
                    error = %e,
                    "Initial JWKS fetch failed, will retry on first request"
                );
                false
            }
        }
    }

    /// Whether any key set (fresh or stale) is cached.
    pub async fn has_keys(&self) -> bool {
        self.inner.state.read().await.current.is_some()
    }

    /// Number of keys in the cached set, zero when empty.
    pub async fn key_count(&self) -> usize {
        self.inner
            .state
            .read()
            .await
            .current
            .as_ref()
            .map_or(0, |cached| cached.keys.len())
    }

    /// Whether the cached set is within its TTL.
    pub async fn is_fresh(&self) -> bool {
        self.inner.state.read().await.fresh(self.inner.ttl).is_some()
    }

    /// Configured TTL.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Configured wait between failed refreshes while stale keys are served.
    pub fn retry_backoff(&self) -> Duration {
        self.inner.retry_backoff
    }

    /// Run one refresh on a detached task that owns the refresh lock.
    async fn spawn_refresh(
        &self,
        guard: OwnedMutexGuard<()>,
    ) -> Result<Arc<KeySet>, KeyFetchError> {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _guard = guard;
            inner.refresh().await
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(target: "api.auth.key_cache", error = %e, "JWKS refresh task failed");
                Err(KeyFetchError::RefreshAborted)
            }
        }
    }
}

impl Inner {
    /// Fetch and record the outcome. Must be called with the refresh lock held.
    async fn refresh(&self) -> Result<Arc<KeySet>, KeyFetchError> {
        let start = Instant::now();
        let result = self.fetcher.fetch().await;
        let duration = start.elapsed();

        let mut state = self.state.write().await;
        state.attempts = state.attempts.wrapping_add(1);

        match result {
            Ok(keyset) => {
                let keys = Arc::new(keyset);
                state.current = Some(CachedKeys {
                    keys: Arc::clone(&keys),
                    fetched_at: Instant::now(),
                });
                state.last_error = None;
                state.failed_at = None;

                record_jwks_refresh("success", None, duration);
                set_jwks_keys_cached(keys.len());
                tracing::info!(
                    target: "api.auth.key_cache",
                    key_count = keys.len(),
                    "Key cache refreshed"
                );
                Ok(keys)
            }
            Err(e) => {
                record_jwks_refresh("error", Some(e.kind()), duration);
                state.last_error = Some(e.clone());
                state.failed_at = Some(Instant::now());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeFetcher {
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    impl FakeFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JwksFetcher for FakeFetcher {
        async fn fetch(&self) -> Result<KeySet, KeyFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(KeyFetchError::Status(503))
            } else {
                Ok(KeySet::default())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_keys_are_served_from_cache() {
        let fetcher = FakeFetcher::new();
        let cache = KeyCache::new(fetcher.clone(), Duration::from_secs(60));

        let first = cache.get_keys().await.unwrap();
        let second = cache.get_keys().await.unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.is_fresh().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_triggers_refetch() {
        let fetcher = FakeFetcher::new();
        let cache = KeyCache::new(fetcher.clone(), Duration::from_secs(60));

        let first = cache.get_keys().await.unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        cache.get_keys().await.unwrap();
        assert_eq!(fetcher.calls(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!cache.is_fresh().await);
        let refreshed = cache.get_keys().await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert!(!Arc::ptr_eq(&first, &refreshed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_cache_fails_closed() {
        let fetcher = FakeFetcher::new();
        fetcher.failing.store(true, Ordering::SeqCst);
        let cache = KeyCache::new(fetcher.clone(), Duration::from_secs(60));

        let err = cache.get_keys().await.unwrap_err();
        assert_eq!(err, KeyFetchError::Status(503));
        assert!(!cache.has_keys().await);
        assert_eq!(cache.key_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_serves_stale_and_retries_after_backoff() {
        let fetcher = FakeFetcher::new();
        let cache = KeyCache::new(fetcher.clone(), Duration::from_secs(60));
        let original = cache.get_keys().await.unwrap();

        fetcher.failing.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(61)).await;

        let stale = cache.get_keys().await.unwrap();
        assert!(Arc::ptr_eq(&original, &stale));
        assert_eq!(fetcher.calls(), 2);

        // Within the backoff the stale keys are served without fetching
        tokio::time::advance(DEFAULT_RETRY_BACKOFF - Duration::from_secs(1)).await;
        let during_backoff = cache.get_keys().await.unwrap();
        assert!(Arc::ptr_eq(&original, &during_backoff));
        assert_eq!(fetcher.calls(), 2);

        // Once it has passed the next caller tries again
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.get_keys().await.unwrap();
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_after_backoff_clears_failure() {
        let fetcher = FakeFetcher::new();
        let backoff = Duration::from_secs(5);
        let cache = KeyCache::with_retry_backoff(fetcher.clone(), Duration::from_secs(60), backoff);
        let original = cache.get_keys().await.unwrap();

        fetcher.failing.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(61)).await;
        cache.get_keys().await.unwrap();
        assert_eq!(fetcher.calls(), 2);

        fetcher.failing.store(false, Ordering::SeqCst);
        tokio::time::advance(backoff).await;
        let refreshed = cache.get_keys().await.unwrap();
        assert_eq!(fetcher.calls(), 3);
        assert!(!Arc::ptr_eq(&original, &refreshed));
        assert!(cache.is_fresh().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_cache_ignores_backoff() {
        let fetcher = FakeFetcher::new();
        fetcher.failing.store(true, Ordering::SeqCst);
        let cache = KeyCache::new(fetcher.clone(), Duration::from_secs(60));

        assert!(cache.get_keys().await.is_err());
        assert!(cache.get_keys().await.is_err());
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_reports_failure_but_keeps_keys() {
        let fetcher = FakeFetcher::new();
        let cache = KeyCache::new(fetcher.clone(), Duration::from_secs(60));
        assert!(cache.warm().await);

        fetcher.failing.store(true, Ordering::SeqCst);
        assert_eq!(
            cache.force_refresh().await.unwrap_err(),
            KeyFetchError::Status(503)
        );
        assert!(cache.has_keys().await);
        assert!(cache.get_keys().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_failure_is_not_fatal() {
        let fetcher = FakeFetcher::new();
        fetcher.failing.store(true, Ordering::SeqCst);
        let cache = KeyCache::new(fetcher.clone(), DEFAULT_CACHE_TTL);

        assert!(!cache.warm().await);

        fetcher.failing.store(false, Ordering::SeqCst);
        assert!(cache.get_keys().await.is_ok());
        assert_eq!(fetcher.calls(), 2);
    }

    #[test]
    fn test_default_ttl_is_24_hours() {
        assert_eq!(DEFAULT_CACHE_TTL, Duration::from_secs(86_400));
        assert_eq!(DEFAULT_RETRY_BACKOFF, Duration::from_secs(10));
    }
}
