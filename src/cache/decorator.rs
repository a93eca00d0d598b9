//! In-memory caching decorator for any `ForecastSource`

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::data::Location;
use crate::error::ApiError;
use crate::sources::ForecastSource;

/// Default time-to-live for cached forecasts
pub const DEFAULT_TTL: Duration = Duration::from_secs(3 * 3600);

/// A cached forecast with its insertion time
#[derive(Debug)]
struct CacheEntry<T> {
    /// The cached data
    data: T,
    /// When the data was cached
    cached_at: Instant,
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Wraps a source and serves repeated requests from memory
///
/// The entry map is only locked to read or write entries. Each key gets its
/// own in-flight lock held across the fetch, so concurrent misses for the same
/// key produce a single fetch and a slow key never blocks the others.
pub struct CachedSource<S: ForecastSource> {
    inner: S,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<S::Forecast>>>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<S: ForecastSource> CachedSource<S> {
    /// Creates a cache with the default TTL
    pub fn new(inner: S) -> Self {
        Self::with_ttl(inner, DEFAULT_TTL)
    }

    /// Creates a cache with a custom TTL
    pub fn with_ttl(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Drops every cached entry
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Current counters and entry count (expired entries not yet swept included)
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().await.len(),
        }
    }

    fn is_fresh(&self, entry: &CacheEntry<S::Forecast>, now: Instant) -> bool {
        now.saturating_duration_since(entry.cached_at) < self.ttl
    }

    /// Returns a fresh entry, evicting the key if it has expired
    async fn lookup(&self, key: &str) -> Option<S::Forecast> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if self.is_fresh(entry, Instant::now()) => Some(entry.data.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// In-flight lock for `key`; locks nobody else holds are dropped
    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.in_flight.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key.to_string()).or_default().clone()
    }

    fn hit(&self, key: &str, data: S::Forecast) -> S::Forecast {
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(source = self.inner.name(), key = %key, "Forecast cache hit");
        data
    }
}

#[async_trait]
impl<S: ForecastSource> ForecastSource for CachedSource<S> {
    type Forecast = S::Forecast;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch_forecast(
        &self,
        location: &Location,
        days: u32,
    ) -> Result<Self::Forecast, ApiError> {
        let key = location.cache_key(days);
        if let Some(data) = self.lookup(&key).await {
            return Ok(self.hit(&key, data));
        }

        let slot = self.key_lock(&key).await;
        let _in_flight = slot.lock().await;
        // another caller may have filled the key while we waited
        if let Some(data) = self.lookup(&key).await {
            return Ok(self.hit(&key, data));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(source = self.inner.name(), key = %key, "Forecast cache miss");
        let data = self.inner.fetch_forecast(location, days).await?;

        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| now.saturating_duration_since(entry.cached_at) < self.ttl);
        entries.insert(
            key,
            CacheEntry {
                data: data.clone(),
                cached_at: now,
            },
        );

        Ok(data)
    }

    async fn shutdown(&self) {
        self.clear().await;
        self.inner.shutdown().await
    }
}
