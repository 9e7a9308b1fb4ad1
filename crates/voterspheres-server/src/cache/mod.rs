//! Two-tier cache facade
//!
//! Redis is the primary tier; a bounded in-process map is the fallback.
//!
//! - primary hit: returned
//! - primary miss: absent (the local map is not consulted)
//! - primary error or timeout: answered from the local map
//! - no primary configured: the local map is the only tier
//!
//! Writes go to the primary and land in the local map only when the primary
//! write fails or there is no primary. Every operation is best-effort:
//! errors are logged and counted, never returned.

pub mod keys;
pub mod local;
pub mod redis;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub use local::LocalCache;
pub use redis::RedisBackend;

pub const DEFAULT_SEARCH_TTL_SECS: u64 = 300;
pub const DEFAULT_PROFILE_TTL_SECS: u64 = 86_400;
pub const DEFAULT_SITEMAP_TTL_SECS: u64 = 43_200;
pub const DEFAULT_OP_TIMEOUT_MS: u64 = 250;
pub const DEFAULT_LOCAL_CAPACITY: usize = 10_000;
pub const DEFAULT_KEY_PREFIX: &str = "vs";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache configuration error: {0}")]
    Config(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// A remote key/value store with per-key expiry
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;
    async fn delete(&self, key: &str) -> CacheResult<()>;
}

/// TTL class of a cached value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Search,
    Profile,
    Sitemap,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// `None` runs on the local map alone
    pub redis_url: Option<String>,
    pub pool_size: usize,
    /// Bound on every primary operation
    pub op_timeout: Duration,
    pub connect_timeout: Duration,
    pub search_ttl: Duration,
    pub profile_ttl: Duration,
    pub sitemap_ttl: Duration,
    pub local_capacity: usize,
    /// Namespace prepended to every key
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            pool_size: redis::DEFAULT_POOL_SIZE,
            op_timeout: Duration::from_millis(DEFAULT_OP_TIMEOUT_MS),
            connect_timeout: Duration::from_secs(5),
            search_ttl: Duration::from_secs(DEFAULT_SEARCH_TTL_SECS),
            profile_ttl: Duration::from_secs(DEFAULT_PROFILE_TTL_SECS),
            sitemap_ttl: Duration::from_secs(DEFAULT_SITEMAP_TTL_SECS),
            local_capacity: DEFAULT_LOCAL_CAPACITY,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self, tier: CacheTier) -> Duration {
        match tier {
            CacheTier::Search => self.search_ttl,
            CacheTier::Profile => self.profile_ttl,
            CacheTier::Sitemap => self.sitemap_ttl,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(url) = &self.redis_url {
            if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
                anyhow::bail!("REDIS_URL must start with redis:// or rediss://");
            }
        }
        if self.op_timeout.is_zero() {
            anyhow::bail!("CACHE_OP_TIMEOUT_MS must be greater than 0");
        }
        if self.local_capacity == 0 {
            anyhow::bail!("CACHE_LOCAL_CAPACITY must be greater than 0");
        }
        for (name, ttl) in [
            ("CACHE_SEARCH_TTL_SECS", self.search_ttl),
            ("CACHE_PROFILE_TTL_SECS", self.profile_ttl),
            ("CACHE_SITEMAP_TTL_SECS", self.sitemap_ttl),
        ] {
            if ttl < Duration::from_secs(1) {
                anyhow::bail!("{} must be at least 1 second", name);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    fallback_hits: AtomicU64,
    errors: AtomicU64,
    writes: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    /// Hits served by the local map while the primary was failing
    pub fallback_hits: u64,
    pub errors: u64,
    pub writes: u64,
}

impl CacheStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fallback_hits: self.fallback_hits.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

pub struct CacheFacade {
    primary: Option<Arc<dyn CacheBackend>>,
    local: LocalCache,
    config: CacheConfig,
    stats: CacheStats,
}

impl CacheFacade {
    pub fn new(primary: Option<Arc<dyn CacheBackend>>, config: CacheConfig) -> Self {
        Self {
            primary,
            local: LocalCache::new(config.local_capacity),
            config,
            stats: CacheStats::default(),
        }
    }

    /// Local map only
    pub fn local_only(config: CacheConfig) -> Self {
        Self::new(None, config)
    }

    /// Connect to `config.redis_url` when set
    pub async fn connect(config: CacheConfig) -> CacheResult<Self> {
        let primary: Option<Arc<dyn CacheBackend>> = match &config.redis_url {
            Some(url) => Some(Arc::new(
                RedisBackend::connect(
                    url,
                    config.pool_size,
                    config.op_timeout,
                    config.connect_timeout,
                )
                .await?,
            )),
            None => None,
        };
        Ok(Self::new(primary, config))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    fn namespaced(&self, key: &str) -> String {
        if self.config.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.config.key_prefix, key)
        }
    }

    fn local_get(&self, key: &str, fallback: bool) -> Option<String> {
        let value = self.local.get(key);
        match (&value, fallback) {
            (Some(_), true) => CacheStats::bump(&self.stats.fallback_hits),
            (Some(_), false) => CacheStats::bump(&self.stats.hits),
            (None, _) => CacheStats::bump(&self.stats.misses),
        }
        value
    }

    fn primary_failed(&self, op: &str, key: &str, error: &str) {
        CacheStats::bump(&self.stats.errors);
        warn!(op, key, error, "Cache primary unavailable, using local map");
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let key = self.namespaced(key);
        let Some(primary) = &self.primary else {
            return self.local_get(&key, false);
        };

        match tokio::time::timeout(self.config.op_timeout, primary.get(&key)).await {
            Ok(Ok(Some(value))) => {
                CacheStats::bump(&self.stats.hits);
                Some(value)
            }
            Ok(Ok(None)) => {
                CacheStats::bump(&self.stats.misses);
                None
            }
            Ok(Err(e)) => {
                self.primary_failed("get", &key, &e.to_string());
                self.local_get(&key, true)
            }
            Err(_) => {
                self.primary_failed("get", &key, "timed out");
                self.local_get(&key, true)
            }
        }
    }

    pub async fn set(&self, key: &str, value: String, tier: CacheTier) {
        let key = self.namespaced(key);
        let ttl = self.config.ttl(tier);

        if let Some(primary) = &self.primary {
            match tokio::time::timeout(self.config.op_timeout, primary.set(&key, &value, ttl)).await {
                Ok(Ok(())) => {
                    CacheStats::bump(&self.stats.writes);
                    return;
                }
                Ok(Err(e)) => self.primary_failed("set", &key, &e.to_string()),
                Err(_) => self.primary_failed("set", &key, "timed out"),
            }
        }

        self.local.set(&key, value, ttl);
        CacheStats::bump(&self.stats.writes);
    }

    pub async fn invalidate(&self, key: &str) {
        let key = self.namespaced(key);
        self.local.delete(&key);

        if let Some(primary) = &self.primary {
            match tokio::time::timeout(self.config.op_timeout, primary.delete(&key)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.primary_failed("invalidate", &key, &e.to_string()),
                Err(_) => self.primary_failed("invalidate", &key, "timed out"),
            }
        }
    }

    /// Decode a cached JSON value; an undecodable value counts as absent
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, tier: CacheTier) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, raw, tier).await,
            Err(e) => warn!(key, error = %e, "Failed to serialize cache value"),
        }
    }

    /// Current search generation; empty until the first bump
    pub async fn search_generation(&self) -> String {
        self.get(&keys::search_generation())
            .await
            .unwrap_or_default()
    }

    /// Orphan every cached search page and filter menu
    pub async fn bump_search_generation(&self) {
        let generation = Uuid::new_v4().simple().to_string();
        // Outlives any search entry written under the old generation
        self.set(&keys::search_generation(), generation, CacheTier::Profile)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;

    /// Primary that always fails
    struct DownBackend;

    #[async_trait]
    impl CacheBackend for DownBackend {
        async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
            Err(CacheError::Backend("connection refused".into()))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
            Err(CacheError::Backend("connection refused".into()))
        }
        async fn delete(&self, _key: &str) -> CacheResult<()> {
            Err(CacheError::Backend("connection refused".into()))
        }
    }

    /// Primary that answers after a delay
    struct SlowBackend(Duration);

    #[async_trait]
    impl CacheBackend for SlowBackend {
        async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
            tokio::time::sleep(self.0).await;
            Ok(Some("late".into()))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
        async fn delete(&self, _key: &str) -> CacheResult<()> {
            Ok(())
        }
    }

    /// Healthy primary backed by a map
    #[derive(Default)]
    struct MapBackend(DashMap<String, String>);

    #[async_trait]
    impl CacheBackend for MapBackend {
        async fn get(&self, key: &str) -> CacheResult<Option<String>> {
            Ok(self.0.get(key).map(|v| v.clone()))
        }
        async fn set(&self, key: &str, value: &str, _ttl: Duration) -> CacheResult<()> {
            self.0.insert(key.to_string(), value.to_string());
            Ok(())
        }
        async fn delete(&self, key: &str) -> CacheResult<()> {
            self.0.remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_local_only_round_trip() {
        let cache = CacheFacade::local_only(CacheConfig::default());
        cache.set("profile:ann", "<html>".into(), CacheTier::Profile).await;
        assert_eq!(cache.get("profile:ann").await.as_deref(), Some("<html>"));
        assert_eq!(cache.get("profile:bob").await, None);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_primary_down_falls_back_to_local() {
        let cache = CacheFacade::new(Some(Arc::new(DownBackend)), CacheConfig::default());
        cache.set("k", "v".into(), CacheTier::Search).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        let stats = cache.stats();
        assert_eq!(stats.fallback_hits, 1);
        assert_eq!(stats.errors, 2);
    }

    #[tokio::test]
    async fn test_primary_timeout_falls_back() {
        let config = CacheConfig {
            op_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let cache = CacheFacade::new(Some(Arc::new(SlowBackend(Duration::from_secs(5)))), config);

        cache.set("k", "v".into(), CacheTier::Search).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_primary_miss_ignores_local() {
        let backend = Arc::new(MapBackend::default());
        let cache = CacheFacade::new(Some(backend.clone()), CacheConfig::default());

        cache.local.set("vs:k", "stale".into(), Duration::from_secs(60));
        assert_eq!(cache.get("k").await, None);

        cache.set("k", "fresh".into(), CacheTier::Profile).await;
        assert!(backend.0.contains_key("vs:k"));
        assert_eq!(cache.get("k").await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_invalidate_clears_both_tiers() {
        let backend = Arc::new(MapBackend::default());
        let cache = CacheFacade::new(Some(backend.clone()), CacheConfig::default());
        cache.set("k", "v".into(), CacheTier::Profile).await;
        cache.local.set("vs:k", "v".into(), Duration::from_secs(60));

        cache.invalidate("k").await;
        assert!(backend.0.is_empty());
        assert!(cache.local.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_json_is_a_miss() {
        let cache = CacheFacade::local_only(CacheConfig::default());
        cache.set("k", "not json".into(), CacheTier::Search).await;
        assert_eq!(cache.get_json::<Vec<u32>>("k").await, None);

        cache.set_json("k", &vec![1u32, 2], CacheTier::Search).await;
        assert_eq!(cache.get_json::<Vec<u32>>("k").await, Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_bumping_search_generation_changes_it() {
        let cache = CacheFacade::local_only(CacheConfig::default());
        assert_eq!(cache.search_generation().await, "");

        cache.bump_search_generation().await;
        let first = cache.search_generation().await;
        cache.bump_search_generation().await;
        let second = cache.search_generation().await;

        assert!(!first.is_empty());
        assert_ne!(first, second);
    }

    #[test]
    fn test_config_validation() {
        assert!(CacheConfig::default().validate().is_ok());
        let bad = CacheConfig {
            redis_url: Some("http://localhost".into()),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
