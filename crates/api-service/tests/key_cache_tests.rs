//! Key cache concurrency tests.
//!
//! Exercise single-flight refresh with many concurrent callers, caller
//! cancellation mid-fetch, and failure sharing. Time is paused so TTL
//! expiry and fetch latency are deterministic.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use api_service::auth::keyset::JwksDocument;
use api_service::auth::{JwksFetcher, KeyCache, KeyFetchError, KeySet};
use api_test_utils::{jwks_json, TestKeypair};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const TTL: Duration = Duration::from_secs(60);
const FETCH_LATENCY: Duration = Duration::from_millis(200);

/// Fetcher with fixed latency that counts calls.
struct SlowFetcher {
    keys: KeySet,
    calls: AtomicUsize,
    failing: AtomicBool,
    started: Notify,
}

impl SlowFetcher {
    fn new() -> Arc<Self> {
        let keypair = TestKeypair::new(1, "key-1");
        let document: JwksDocument = serde_json::from_value(jwks_json(&[&keypair])).unwrap();
        Arc::new(Self {
            keys: KeySet::from_document(&document).unwrap(),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            started: Notify::new(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl JwksFetcher for SlowFetcher {
    async fn fetch(&self) -> Result<KeySet, KeyFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        tokio::time::sleep(FETCH_LATENCY).await;
        if self.failing.load(Ordering::SeqCst) {
            Err(KeyFetchError::Status(500))
        } else {
            Ok(self.keys.clone())
        }
    }
}

fn cache_with(fetcher: &Arc<SlowFetcher>) -> KeyCache {
    KeyCache::new(Arc::clone(fetcher) as Arc<dyn JwksFetcher>, TTL)
}

async fn concurrent_get_keys(cache: &KeyCache, callers: usize) -> Vec<Result<usize, KeyFetchError>> {
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_keys().await.map(|keys| keys.len()) })
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("caller task should not panic"))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_stale_callers_share_one_fetch() {
    let fetcher = SlowFetcher::new();
    let cache = cache_with(&fetcher);

    cache.get_keys().await.unwrap();
    assert_eq!(fetcher.calls(), 1);

    tokio::time::advance(TTL + Duration::from_secs(1)).await;

    let results = concurrent_get_keys(&cache, 50).await;
    assert!(results.iter().all(|r| r == &Ok(1)));
    assert_eq!(fetcher.calls(), 2);
    assert!(cache.is_fresh().await);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_cold_callers_share_one_fetch() {
    let fetcher = SlowFetcher::new();
    let cache = cache_with(&fetcher);

    let results = concurrent_get_keys(&cache, 25).await;
    assert!(results.iter().all(|r| r == &Ok(1)));
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_caller_does_not_abandon_fetch() {
    let fetcher = SlowFetcher::new();
    let cache = cache_with(&fetcher);

    let first = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get_keys().await })
    };

    // Cancel the caller once its fetch is in flight
    fetcher.started.notified().await;
    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());

    let keys = cache.get_keys().await.unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_failure_on_empty_cache_is_shared() {
    let fetcher = SlowFetcher::new();
    fetcher.fail();
    let cache = cache_with(&fetcher);

    let results = concurrent_get_keys(&cache, 20).await;
    assert!(results
        .iter()
        .all(|r| r == &Err(KeyFetchError::Status(500))));
    assert_eq!(fetcher.calls(), 1);
    assert!(!cache.has_keys().await);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_failure_with_stale_keys_serves_stale() {
    let fetcher = SlowFetcher::new();
    let cache = cache_with(&fetcher);
    cache.get_keys().await.unwrap();

    fetcher.fail();
    tokio::time::advance(TTL + Duration::from_secs(1)).await;

    let results = concurrent_get_keys(&cache, 20).await;
    assert!(results.iter().all(|r| r == &Ok(1)));
    assert_eq!(fetcher.calls(), 2);
    assert!(!cache.is_fresh().await);
    assert!(cache.has_keys().await);
}
