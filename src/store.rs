// Data-access store: the response cache and the de-duplicator, bundled so
// every service shares one instance. Constructed explicitly and injected;
// tests build an isolated store per case.

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{CacheConfig, CachePolicy, CacheStatsReport, ResponseCache};
use crate::dedup::{DedupStats, RequestDeduplicator};
use crate::error::ApiError;

pub struct DataStore {
    cache: Arc<ResponseCache>,
    dedup: RequestDeduplicator<Value>,
}

impl DataStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            cache: Arc::new(ResponseCache::new(config)),
            dedup: RequestDeduplicator::new(),
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    // Cached read. A fresh entry is returned directly; otherwise concurrent
    // callers for `key` share one `fetch`, whose result is cached under `policy`
    // unless the cache was cleared while it was in flight.
    pub async fn read_through<F, Fut>(
        &self,
        key: &str,
        policy: CachePolicy,
        fetch: F,
    ) -> Result<Value, ApiError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        if let Some(value) = self.cache.get(key) {
            return Ok(value);
        }

        let cache = Arc::clone(&self.cache);
        let owned_key = key.to_string();

        self.dedup
            .deduplicate(key, move || {
                // Read at registration time, before the request can be sent
                let epoch = cache.epoch();
                async move {
                    // Another request may have filled the entry since our miss
                    if let Some(value) = cache.get(&owned_key) {
                        return Ok(value);
                    }
                    let value = fetch().await?;
                    cache.set_if_current(&owned_key, value.clone(), policy, epoch);
                    Ok(value)
                }
            })
            .await
    }

    // Runs a mutating request and, if it succeeded, drops every cached entry
    // and detaches in-flight reads so nothing fetched before it is served after it.
    pub async fn mutate<Fut>(&self, operation: &str, request: Fut) -> Result<Value, ApiError>
    where
        Fut: Future<Output = Result<Value, ApiError>>,
    {
        let value = request.await?;
        self.invalidate_all(operation);
        Ok(value)
    }

    pub fn invalidate_all(&self, reason: &str) {
        let cleared = self.cache.clear();
        let detached = self.dedup.forget_all();
        info!(reason, cleared, detached, "invalidated cached responses");
    }

    // Drops one key so the next read refetches it
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.cache.invalidate(key);
        debug!(key, removed, "invalidated cache key");
        removed
    }

    pub fn cache_stats(&self) -> CacheStatsReport {
        self.cache.stats()
    }

    pub fn dedup_stats(&self) -> DedupStats {
        self.dedup.stats()
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        value: Value,
    ) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<Value, ApiError>> + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(value)
            })
        }
    }

    #[tokio::test]
    async fn test_read_through_caches_and_deduplicates() {
        let store = DataStore::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = CachePolicy::UntilInvalidated;

        let (a, b, c) = tokio::join!(
            store.read_through("slots", policy, counting_fetch(&calls, json!([1]))),
            store.read_through("slots", policy, counting_fetch(&calls, json!([2]))),
            store.read_through("slots", policy, counting_fetch(&calls, json!([3]))),
        );
        assert_eq!(a, Ok(json!([1])));
        assert_eq!(b, Ok(json!([1])));
        assert_eq!(c, Ok(json!([1])));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Served from cache now
        let cached = store
            .read_through("slots", policy, counting_fetch(&calls, json!([4])))
            .await;
        assert_eq!(cached, Ok(json!([1])));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.cache_stats().hit_count, 1);
        assert_eq!(store.dedup_stats().joined, 2);
    }

    #[tokio::test]
    async fn test_failed_read_is_not_cached() {
        let store = DataStore::default();
        let failed = store
            .read_through("users", CachePolicy::default(), || async {
                Err(ApiError::NetworkError("connection reset".into()))
            })
            .await;
        assert!(failed.is_err());
        assert!(store.cache().is_empty());

        let retried = store
            .read_through("users", CachePolicy::default(), || async { Ok(json!([])) })
            .await;
        assert_eq!(retried, Ok(json!([])));
    }

    #[tokio::test]
    async fn test_mutation_clears_cache_only_on_success() {
        let store = DataStore::default();
        store.cache().set("slots", json!([1]));

        let failed = store
            .mutate("book slot", async {
                Err(ApiError::HttpError {
                    status: 400,
                    message: Some("Slot is already booked".into()),
                })
            })
            .await;
        assert!(failed.is_err());
        assert_eq!(store.cache().get("slots"), Some(json!([1])));

        let booked = store.mutate("book slot", async { Ok(json!({ "id": 7 })) }).await;
        assert_eq!(booked, Ok(json!({ "id": 7 })));
        assert_eq!(store.cache().get("slots"), None);
    }

    #[tokio::test]
    async fn test_read_in_flight_across_mutation_is_not_cached() {
        let store = Arc::new(DataStore::default());
        let (release, gate) = oneshot::channel::<()>();

        let reader = tokio::spawn({
            let store = Arc::clone(&store);
            async move {
                store
                    .read_through("slots", CachePolicy::UntilInvalidated, move || async move {
                        let _ = gate.await;
                        Ok(json!(["before booking"]))
                    })
                    .await
            }
        });
        while store.dedup_stats().in_flight == 0 {
            tokio::task::yield_now().await;
        }

        store.mutate("book slot", async { Ok(json!({})) }).await.unwrap();
        release.send(()).unwrap();

        // The waiter still gets its answer, but it is not kept
        assert_eq!(reader.await.unwrap(), Ok(json!(["before booking"])));
        assert!(store.cache().get("slots").is_none());
    }
}
