//! Full-text engine adapter
//!
//! [`FullTextEngine`] is the read path used by the strategies and the
//! orchestrator; [`IndexAdmin`] covers document and index lifecycle calls
//! made by ingestion tooling. [`ElasticsearchEngine`] implements both over
//! the Elasticsearch/OpenSearch REST API.

pub mod client;
pub mod models;
pub mod query;
pub mod response;

pub use client::ElasticsearchEngine;
pub use models::{BulkReport, EngineHealth, EngineQuery, EngineResponse, IndexStatus, IndexedDocument};
pub use query::QueryBuilder;

use crate::error::Result;
use crate::search::models::Suggestion;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait FullTextEngine: Send + Sync {
    /// Run a keyword query
    async fn search(&self, query: &EngineQuery) -> Result<EngineResponse>;

    /// Completion suggestions for a partial query, optionally per content type
    async fn suggest(&self, partial: &str, kind: Option<&str>, limit: usize) -> Result<Vec<Suggestion>>;

    /// Cluster health
    async fn health(&self) -> Result<EngineHealth>;
}

#[async_trait]
pub trait IndexAdmin: Send + Sync {
    async fn index_document(&self, document: &IndexedDocument) -> Result<()>;

    async fn bulk_index(&self, documents: &[IndexedDocument]) -> Result<BulkReport>;

    /// Partial update of one document
    async fn update_document(&self, id: &str, partial: Value) -> Result<()>;

    /// Returns false when the document did not exist
    async fn delete_document(&self, id: &str) -> Result<bool>;

    async fn create_index(&self, name: &str, definition: Value) -> Result<()>;

    async fn delete_index(&self, name: &str) -> Result<()>;

    async fn index_exists(&self, name: &str) -> Result<bool>;

    async fn index_status(&self, name: &str) -> Result<IndexStatus>;

    async fn put_mapping(&self, name: &str, mapping: Value) -> Result<()>;

    async fn put_settings(&self, name: &str, settings: Value) -> Result<()>;

    /// Point `alias` at `new_index`, detaching it from `old_index` atomically
    async fn update_alias(&self, alias: &str, new_index: &str, old_index: Option<&str>) -> Result<()>;
}
