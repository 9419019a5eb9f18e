//! Query embedding cache.
//!
//! Semantic and RAG strategies embed the same query at the same moment, so
//! concurrent lookups for one text share a single upstream call. Keys are a
//! SHA-256 digest of the model name and the whitespace-collapsed text.

use crate::error::{EmbeddingError, Result, SearchError};
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Lookup counters since creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingCacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct QueryEmbeddingCache {
    entries: Cache<String, Vec<f32>>,
    model: String,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryEmbeddingCache {
    pub fn new(model: Option<&str>, max_size: usize, ttl: Duration) -> Self {
        let model = model.unwrap_or("default").to_string();
        info!(
            "Initializing query embedding cache for model {} with max_size={}, ttl={:?}",
            model, max_size, ttl
        );

        let entries = Cache::builder()
            .max_capacity(max_size as u64)
            .time_to_live(ttl)
            .build();

        Self {
            entries,
            model,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Digest identifying `text` under this cache's model
    pub fn key(&self, text: &str) -> String {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update([0u8]);
        hasher.update(collapsed.as_bytes());
        format!("emb:{}", hex::encode(hasher.finalize()))
    }

    pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
        let found = self.entries.get(&self.key(text)).await;
        self.count(found.is_some());
        found
    }

    pub async fn insert(&self, text: &str, embedding: Vec<f32>) {
        self.entries.insert(self.key(text), embedding).await;
    }

    /// Return the cached vector or run `fetch` once for all concurrent
    /// callers asking for the same text. Failures are not cached.
    pub async fn get_or_fetch<F>(&self, text: &str, fetch: F) -> Result<Vec<f32>>
    where
        F: Future<Output = Result<Vec<f32>>>,
    {
        let entry = self
            .entries
            .entry(self.key(text))
            .or_try_insert_with(fetch)
            .await
            .map_err(unshare)?;

        self.count(!entry.is_fresh());
        Ok(entry.into_value())
    }

    pub fn stats(&self) -> EmbeddingCacheStats {
        EmbeddingCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
        info!("Query embedding cache cleared");
    }

    fn count(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A failed fetch is handed to every waiting caller; only the last owner
/// gets the original error back.
fn unshare(error: Arc<SearchError>) -> SearchError {
    Arc::try_unwrap(error).unwrap_or_else(|shared| {
        debug!("Embedding fetch failed for a coalesced lookup: {}", shared);
        EmbeddingError::ApiError(shared.to_string()).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn cache(ttl: Duration) -> QueryEmbeddingCache {
        QueryEmbeddingCache::new(Some("e5"), 10, ttl)
    }

    #[tokio::test]
    async fn test_key_collapses_whitespace_and_scopes_model() {
        let e5 = cache(Duration::from_secs(60));
        let other = QueryEmbeddingCache::new(Some("bge"), 10, Duration::from_secs(60));

        assert_eq!(e5.key("rust  ownership "), e5.key("rust ownership"));
        assert_ne!(e5.key("rust ownership"), e5.key("Rust ownership"));
        assert_ne!(e5.key("rust ownership"), other.key("rust ownership"));
        assert!(e5.key("rust").starts_with("emb:"));
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_fetch() {
        let cache = cache(Duration::from_secs(60));
        let counter = AtomicUsize::new(0);
        let fetches = &counter;
        let fetch = move || async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, SearchError>(vec![0.5, 0.5])
        };

        let (a, b) = tokio::join!(
            cache.get_or_fetch("what is ownership", fetch()),
            cache.get_or_fetch("what is ownership", fetch()),
        );

        assert_eq!(a.unwrap(), vec![0.5, 0.5]);
        assert_eq!(b.unwrap(), vec![0.5, 0.5]);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats(), EmbeddingCacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let cache = cache(Duration::from_secs(60));

        let err = cache
            .get_or_fetch("borrowing", async {
                Err(EmbeddingError::RateLimitExceeded.into())
            })
            .await
            .unwrap_err();
        assert!(err.is_transient());

        let value = cache
            .get_or_fetch("borrowing", async { Ok(vec![1.0]) })
            .await
            .unwrap();
        assert_eq!(value, vec![1.0]);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = cache(Duration::from_millis(100));

        cache.insert("lifetimes", vec![1.0]).await;
        assert_eq!(cache.get("lifetimes").await, Some(vec![1.0]));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get("lifetimes").await, None);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = cache(Duration::from_secs(60));
        cache.insert("traits", vec![1.0]).await;
        cache.clear().await;

        assert_eq!(cache.len().await, 0);
    }
}
