//! Vector store integration and the vector search service

pub mod client;
pub mod memory;
pub mod models;
pub mod service;

pub use client::QdrantVectorStore;
pub use memory::InMemoryVectorStore;
pub use models::{VectorRecord, VectorSearchResult};
pub use service::VectorSearchService;

use crate::error::Result;
use crate::search::models::SearchFilters;
use async_trait::async_trait;

/// Trait for vector storage operations
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Nearest neighbours by cosine similarity, at most `limit` rows with
    /// similarity of at least `threshold`
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        threshold: f32,
        filters: &SearchFilters,
    ) -> Result<Vec<VectorSearchResult>>;

    /// Insert or overwrite rows
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Remove every row belonging to the given content ids
    async fn delete_by_content(&self, content_ids: &[String]) -> Result<()>;

    /// Stored embedding of a content item (its first chunk when chunked)
    async fn get_embedding(&self, content_id: &str) -> Result<Option<Vec<f32>>>;

    /// Liveness probe
    async fn health(&self) -> Result<()>;
}
