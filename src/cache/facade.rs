//! Cache Facade
//!
//! The one entry point callers use. Wraps the selected backend, converts
//! typed values to and from JSON, and keeps hit/miss/set/invalidation
//! counters.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::backend::{CacheBackend, CacheStats};
use crate::cache::local::LocalBackend;
use crate::cache::metrics::{CacheMetrics, MetricsSnapshot};

/// Shared handle to the cache. Cloning is cheap.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    metrics: Arc<CacheMetrics>,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            metrics: Arc::new(CacheMetrics::new()),
        }
    }

    /// Cache over a fresh in-process backend.
    pub fn local() -> Self {
        Self::new(Arc::new(LocalBackend::new()))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    // == Get ==
    /// Returns the cached value, or `None` on a miss.
    ///
    /// A stored value that does not decode as `T` counts as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let decoded = match self.backend.get(key).await {
            Some(value) => match serde_json::from_value(value) {
                Ok(decoded) => Some(decoded),
                Err(err) => {
                    warn!(key, error = %err, "Cached value has unexpected shape");
                    None
                }
            },
            None => None,
        };

        if decoded.is_some() {
            self.metrics.record_hit();
        } else {
            self.metrics.record_miss();
        }
        decoded
    }

    // == Set ==
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        tags: &[String],
    ) {
        self.metrics.record_set();

        match serde_json::to_value(value) {
            Ok(value) => self.backend.set(key, value, ttl, tags).await,
            Err(err) => warn!(key, error = %err, "Value not cacheable, skipping"),
        }
    }

    // == Get Or Load ==
    /// Read-through: returns the cached value, or awaits `load`, caches its
    /// result and returns it. Loader errors are returned as-is and nothing
    /// is cached.
    pub async fn get_or_load<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        tags: &[String],
        load: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get(key).await {
            return Ok(cached);
        }

        debug!(key, "Cache miss, loading");
        let value = load().await?;
        self.set(key, &value, ttl, tags).await;
        Ok(value)
    }

    // == Invalidation ==
    pub async fn invalidate_key(&self, key: &str) {
        self.metrics.record_invalidation();
        self.backend.invalidate_key(key).await;
    }

    pub async fn invalidate_by_tags(&self, tags: &[String]) {
        self.metrics.record_invalidation();
        self.backend.invalidate_by_tags(tags).await;
    }

    pub async fn clear(&self) {
        self.backend.clear().await;
    }

    /// Sweeps expired entries from the backend.
    pub async fn purge_expired(&self) -> usize {
        self.backend.purge_expired().await
    }

    // == Observability ==
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn stats(&self) -> CacheStats {
        self.backend.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use serde::Deserialize;

    const MINUTE: Duration = Duration::from_secs(60);

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        level: u32,
    }

    fn cache_with_clock() -> (Cache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let backend = Arc::new(LocalBackend::with_clock(clock.clone()));
        (Cache::new(backend), clock)
    }

    fn record() -> Record {
        Record {
            name: "ann".to_string(),
            level: 3,
        }
    }

    #[tokio::test]
    async fn test_typed_round_trip_counts_hit() {
        let cache = Cache::local();
        cache.set("r", &record(), MINUTE, &[]).await;

        assert_eq!(cache.get::<Record>("r").await, Some(record()));

        let m = cache.metrics();
        assert_eq!((m.hits, m.misses, m.sets, m.total_requests), (1, 0, 1, 1));
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_a_miss() {
        let cache = Cache::local();
        cache.set("r", &"just a string", MINUTE, &[]).await;

        assert_eq!(cache.get::<Record>("r").await, None);
        assert_eq!(cache.metrics().misses, 1);
    }

    #[tokio::test]
    async fn test_metrics_accuracy() {
        let cache = Cache::local();
        cache.set("a", &1, MINUTE, &[]).await;
        cache.set("b", &2, MINUTE, &[]).await;

        let mut hits = 0;
        for key in ["a", "b", "c", "a", "d"] {
            if cache.get::<i32>(key).await.is_some() {
                hits += 1;
            }
        }

        let m = cache.metrics();
        assert_eq!(m.hits, hits);
        assert_eq!(m.misses, 5 - hits);
        assert_eq!(m.total_requests, 5);
        assert!((m.hit_rate - hits as f64 / 5.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_invalidations_are_counted() {
        let cache = Cache::local();
        cache.invalidate_key("missing").await;
        cache.invalidate_by_tags(&["nothing".to_string()]).await;
        cache.clear().await;

        assert_eq!(cache.metrics().invalidations, 2);
    }

    #[tokio::test]
    async fn test_expiry_through_facade() {
        let (cache, clock) = cache_with_clock();
        cache.set("k", &record(), Duration::from_millis(1_500), &[]).await;

        assert!(cache.get::<Record>("k").await.is_some());

        clock.advance(Duration::from_millis(1_500));
        assert!(cache.get::<Record>("k").await.is_none());
    }

    #[tokio::test]
    async fn test_get_or_load_caches_result() {
        let cache = Cache::local();
        let mut calls = 0;

        let first: Result<Record, String> = cache
            .get_or_load("r", MINUTE, &[], || {
                calls += 1;
                async { Ok(record()) }
            })
            .await;
        let second: Result<Record, String> = cache
            .get_or_load("r", MINUTE, &[], || async { Err("loader must not run".to_string()) })
            .await;

        assert_eq!(first, Ok(record()));
        assert_eq!(second, Ok(record()));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_get_or_load_error_not_cached() {
        let cache = Cache::local();

        let result: Result<Record, &str> = cache
            .get_or_load("r", MINUTE, &[], || async { Err("db down") })
            .await;

        assert_eq!(result, Err("db down"));
        assert_eq!(cache.stats().await.size, 0);
        assert_eq!(cache.metrics().sets, 0);
    }

    #[tokio::test]
    async fn test_stats_reports_backend() {
        let cache = Cache::local();
        cache.set("k", &1, MINUTE, &["t".to_string()]).await;

        let stats = cache.stats().await;
        assert_eq!(stats.backend_name, "local");
        assert_eq!(stats.size, 1);
        assert_eq!(stats.version, 1);
        assert_eq!(stats.tags, vec!["t", "user:k"]);
        assert_eq!(cache.backend_name(), "local");
    }
}
