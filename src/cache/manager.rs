//! Cache manager combining a bounded in-process tier with a distributed tier

use super::keys::CacheKeys;
use super::DistributedCache;
use crate::config::CacheConfig;
use crate::observability::MetricsCollector;
use crate::search::models::{PopularSearch, SearchResponse, Suggestion};
use moka::future::Cache;
use moka::Expiry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Clone)]
struct LocalEntry {
    value: Arc<str>,
    ttl: Duration,
}

/// Tier-1 entries live for the shorter of their own TTL and the tier-1 TTL
struct LocalExpiry;

impl Expiry<String, LocalEntry> for LocalExpiry {
    fn expire_after_create(&self, _key: &String, value: &LocalEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Two-tier cache for search, suggestion and popular-query data.
///
/// Every failure in either tier is logged and treated as a miss; callers
/// never see a cache error.
pub struct CacheManager {
    local: Cache<String, LocalEntry>,
    remote: Arc<dyn DistributedCache>,
    keys: CacheKeys,
    config: CacheConfig,
    metrics: Option<Arc<MetricsCollector>>,
}

impl CacheManager {
    /// Create a cache manager over the given distributed tier
    pub fn new(config: CacheConfig, remote: Arc<dyn DistributedCache>) -> Self {
        info!(
            "Initializing cache manager with local_capacity={}, local_ttl={}s",
            config.local_capacity, config.local_ttl_secs
        );

        let local = Cache::builder()
            .max_capacity(config.local_capacity)
            .expire_after(LocalExpiry)
            .build();

        Self {
            local,
            remote,
            keys: CacheKeys::new(config.key_prefix.clone()),
            config,
            metrics: None,
        }
    }

    /// Set metrics collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.config.local_ttl_secs)
    }

    fn hit(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_hit();
        }
    }

    fn miss(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_miss();
        }
    }

    /// Read a value: tier 1 first, then tier 2 (back-filling tier 1)
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(entry) = self.local.get(key).await {
            match serde_json::from_str(&entry.value) {
                Ok(value) => {
                    debug!("Local cache hit for key: {}", key);
                    self.hit();
                    return Some(value);
                }
                Err(e) => {
                    warn!("Discarding undecodable local cache entry {}: {}", key, e);
                    self.local.invalidate(key).await;
                }
            }
        }

        match self.remote.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!("Distributed cache hit for key: {}", key);
                    self.local
                        .insert(
                            key.to_string(),
                            LocalEntry {
                                value: Arc::from(raw.as_str()),
                                ttl: self.local_ttl(),
                            },
                        )
                        .await;
                    self.hit();
                    Some(value)
                }
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    self.miss();
                    None
                }
            },
            Ok(None) => {
                debug!("Cache miss for key: {}", key);
                self.miss();
                None
            }
            Err(e) => {
                warn!("Cache read failed for {}, treating as miss: {}", key, e);
                self.miss();
                None
            }
        }
    }

    /// Write a value to both tiers
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize cache value for {}: {}", key, e);
                return;
            }
        };

        self.local
            .insert(
                key.to_string(),
                LocalEntry {
                    value: Arc::from(raw.as_str()),
                    ttl: ttl.min(self.local_ttl()),
                },
            )
            .await;

        if let Err(e) = self.remote.set(key, &raw, ttl).await {
            warn!("Cache write failed for {}: {}", key, e);
        } else {
            debug!("Cached key {} for {:?}", key, ttl);
        }
    }

    /// Remove one key from both tiers
    pub async fn delete(&self, key: &str) {
        self.local.invalidate(key).await;
        if let Err(e) = self.remote.delete(key).await {
            warn!("Cache delete failed for {}: {}", key, e);
        }
    }

    /// Remove distributed keys matching `pattern` (relative to the key prefix)
    /// and clear the whole local tier
    pub async fn delete_pattern(&self, pattern: &str) -> usize {
        let full_pattern = self.keys.pattern(pattern);

        self.local.invalidate_all();
        self.local.run_pending_tasks().await;

        match self.remote.delete_pattern(&full_pattern).await {
            Ok(removed) => {
                info!("Invalidated {} cache entries matching '{}'", removed, full_pattern);
                removed
            }
            Err(e) => {
                warn!("Cache pattern delete failed for '{}': {}", full_pattern, e);
                0
            }
        }
    }

    /// Cache a fused search response
    pub async fn cache_search_results<S: Serialize>(&self, query: &str, scope: &S, response: &SearchResponse) {
        let key = self.keys.search(query, scope);
        self.set(&key, response, Duration::from_secs(self.config.search_ttl_secs)).await;
    }

    /// Look up a cached search response
    pub async fn get_cached_search_results<S: Serialize>(&self, query: &str, scope: &S) -> Option<SearchResponse> {
        let key = self.keys.search(query, scope);
        self.get(&key).await
    }

    /// Cache suggestions for a partial query
    pub async fn cache_suggestions(&self, partial: &str, kind: Option<&str>, suggestions: &[Suggestion]) {
        let key = self.keys.suggestions(partial, kind);
        self.set(&key, &suggestions, Duration::from_secs(self.config.suggestion_ttl_secs)).await;
    }

    /// Look up cached suggestions
    pub async fn get_cached_suggestions(&self, partial: &str, kind: Option<&str>) -> Option<Vec<Suggestion>> {
        let key = self.keys.suggestions(partial, kind);
        self.get(&key).await
    }

    /// Cache the popular-searches list
    pub async fn cache_popular_searches(&self, popular: &[PopularSearch]) {
        let key = self.keys.popular();
        self.set(&key, &popular, Duration::from_secs(self.config.popular_ttl_secs)).await;
    }

    /// Look up the cached popular-searches list
    pub async fn get_cached_popular_searches(&self) -> Option<Vec<PopularSearch>> {
        let key = self.keys.popular();
        self.get(&key).await
    }

    /// Whether the distributed tier answers
    pub async fn is_healthy(&self) -> bool {
        match self.remote.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Distributed cache health check failed: {}", e);
                false
            }
        }
    }

    /// Entries currently held in the local tier
    pub async fn local_entry_count(&self) -> u64 {
        self.local.run_pending_tasks().await;
        self.local.entry_count()
    }
}
