//! Time-bounded cache for price history to reduce provider calls

use cached::{Cached, TimedCache};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::series::{Period, PriceSeries};

/// Cache key for price-history requests
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryKey {
    pub symbol: String,
    pub period: Period,
}

impl HistoryKey {
    pub fn new(symbol: impl Into<String>, period: Period) -> Self {
        Self {
            symbol: symbol.into(),
            period,
        }
    }
}

/// Shared cache of fetched price series; clones share storage
#[derive(Clone)]
pub struct HistoryCache {
    cache: Arc<RwLock<TimedCache<HistoryKey, PriceSeries>>>,
}

impl HistoryCache {
    /// Create a new cache with specified TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(TimedCache::with_lifespan(ttl))),
        }
    }

    pub async fn get(&self, key: &HistoryKey) -> Option<PriceSeries> {
        // TimedCache evicts on read, so lookups need the write lock
        let mut cache = self.cache.write().await;
        cache.cache_get(key).cloned()
    }

    pub async fn insert(&self, key: HistoryKey, series: PriceSeries) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_set(key, series);
    }

    /// Return the cached series or fetch, store and return a fresh one.
    ///
    /// Failed fetches are not cached.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: HistoryKey,
        fetcher: F,
    ) -> Result<PriceSeries, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PriceSeries, E>>,
    {
        if let Some(series) = self.get(&key).await {
            debug!(symbol = %key.symbol, period = %key.period, "history cache hit");
            return Ok(series);
        }

        debug!(symbol = %key.symbol, period = %key.period, "history cache miss");
        let series = fetcher().await?;
        self.insert(key, series.clone()).await;
        Ok(series)
    }

    pub async fn invalidate(&self, key: &HistoryKey) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_remove(key);
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.cache_clear();
    }

    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.cache_size()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn series(symbol: &str) -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        PriceSeries::from_closes(symbol, start, &[10.0, 11.0, 12.0]).unwrap()
    }

    #[tokio::test]
    async fn test_cache_insert_and_get() {
        let cache = HistoryCache::new(Duration::from_secs(60));
        let key = HistoryKey::new("AAPL", Period::OneYear);

        cache.insert(key.clone(), series("AAPL")).await;

        assert_eq!(cache.get(&key).await, Some(series("AAPL")));
        assert!(cache.get(&HistoryKey::new("AAPL", Period::TwoYears)).await.is_none());
    }

    #[tokio::test]
    async fn test_cache_get_or_fetch() {
        let cache = HistoryCache::new(Duration::from_secs(60));
        let key = HistoryKey::new("MSFT", Period::TwoYears);

        let mut call_count = 0;
        let result = cache
            .get_or_fetch(key.clone(), || {
                call_count += 1;
                async { Ok::<_, String>(series("MSFT")) }
            })
            .await
            .unwrap();
        assert_eq!(result.symbol(), "MSFT");
        assert_eq!(call_count, 1);

        let result = cache
            .get_or_fetch(key.clone(), || {
                call_count += 1;
                async { Ok::<_, String>(series("MSFT")) }
            })
            .await
            .unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(call_count, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let cache = HistoryCache::new(Duration::from_secs(60));
        let key = HistoryKey::new("NONE", Period::OneYear);

        let result = cache
            .get_or_fetch(key.clone(), || async { Err::<PriceSeries, _>("boom") })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_cache_invalidation_and_clear() {
        let cache = HistoryCache::new(Duration::from_secs(60));
        let key = HistoryKey::new("AAPL", Period::OneYear);
        cache.insert(key.clone(), series("AAPL")).await;
        cache.invalidate(&key).await;
        assert!(cache.get(&key).await.is_none());

        for symbol in ["A", "B", "C"] {
            cache
                .insert(HistoryKey::new(symbol, Period::OneYear), series(symbol))
                .await;
        }
        assert_eq!(cache.len().await, 3);
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
