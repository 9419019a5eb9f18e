//! Two-tier cache: in-process moka cache in front of a shared distributed cache

pub mod keys;
pub mod manager;
pub mod memory;

pub use manager::CacheManager;
pub use memory::InMemoryDistributedCache;

use crate::error::CacheError;
use async_trait::async_trait;
use std::time::Duration;

/// Result type for cache backends
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Shared, string-keyed cache reachable from every service instance
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Fetch a value if present and not expired
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store a value with a time-to-live
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Remove one key, returning whether it existed
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Remove every key matching a glob pattern, returning the count removed
    async fn delete_pattern(&self, pattern: &str) -> CacheResult<usize>;

    /// Liveness probe
    async fn ping(&self) -> CacheResult<()>;
}
