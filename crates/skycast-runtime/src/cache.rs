//! Caching layer for skycast-runtime.
//!
//! Holds weather snapshots keyed by postal code. Freshness is recomputed on
//! every read from the stored capture time, so an expired entry stays
//! available as a stale fallback until the retention period evicts it.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long an entry counts as fresh
    #[serde(with = "crate::config::duration_str")]
    pub ttl: Duration,

    /// How long an entry is kept for stale reads
    #[serde(with = "crate::config::duration_str")]
    pub retention: Duration,

    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            retention: Duration::from_secs(24 * 60 * 60),
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedEntry<V> {
    value: V,
    captured_at: DateTime<Utc>,
    ttl: Duration,
}

impl<V> CachedEntry<V> {
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.captured_at);
        // Negative age (clock moved back) counts as fresh.
        age.to_std().map(|age| age > self.ttl).unwrap_or(false)
    }
}

/// A value read from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit<V> {
    pub value: V,
    pub captured_at: DateTime<Utc>,
    pub is_stale: bool,
}

/// Time-expiring cache with stale-read support, backed by moka.
///
/// Concurrent writers for the same key are last-writer-wins; either value is
/// a valid snapshot.
pub struct ResultCache<V> {
    cache: Cache<String, CachedEntry<V>>,
    default_ttl: Duration,
}

impl<V> ResultCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.retention.max(config.ttl))
            .build();

        Self {
            cache,
            default_ttl: config.ttl,
        }
    }

    /// Freshness window used by callers that do not pick their own.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Read a fresh entry. Expired entries read as absent.
    pub async fn read(&self, key: &str) -> Option<CacheHit<V>> {
        self.read_allow_stale(key).await.filter(|hit| !hit.is_stale)
    }

    /// Read an entry regardless of age, flagging it when expired.
    pub async fn read_allow_stale(&self, key: &str) -> Option<CacheHit<V>> {
        let entry = self.cache.get(key).await?;
        let is_stale = entry.is_stale(Utc::now());
        Some(CacheHit {
            value: entry.value,
            captured_at: entry.captured_at,
            is_stale,
        })
    }

    /// Store a value captured now.
    pub async fn write(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.insert_at(key, value, ttl, Utc::now()).await;
    }

    /// Store a value with an explicit capture time.
    pub async fn insert_at(
        &self,
        key: impl Into<String>,
        value: V,
        ttl: Duration,
        captured_at: DateTime<Utc>,
    ) {
        let key = key.into();
        tracing::debug!(key = %key, ttl = ?ttl, "Caching result");
        self.cache
            .insert(
                key,
                CachedEntry {
                    value,
                    captured_at,
                    ttl,
                },
            )
            .await;
    }

    /// Clear the cache.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Get cache statistics.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl<V> Default for ResultCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}
