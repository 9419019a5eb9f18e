//! Similarity search and RAG context assembly over a vector store

use super::models::{fields, VectorRecord, VectorSearchResult};
use super::VectorStore;
use crate::error::{Result, SearchError, VectorSearchError};
use crate::rag::{select_contexts, RagContext, RagContextMetadata, TokenEstimator};
use crate::search::models::SearchFilters;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rows written per store call
const STORE_BATCH: usize = 100;

/// Vector search service used by the semantic and RAG strategies
pub struct VectorSearchService {
    store: Arc<dyn VectorStore>,
    max_results: usize,
    estimator: TokenEstimator,
}

impl VectorSearchService {
    pub fn new(store: Arc<dyn VectorStore>, max_results: usize) -> Self {
        Self {
            store,
            max_results: max_results.max(1),
            estimator: TokenEstimator::default(),
        }
    }

    pub fn with_token_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Nearest rows with similarity strictly above `threshold`, most similar
    /// first, at most `min(limit, max_results)` of them.
    ///
    /// A `minScore` filter raises the threshold.
    pub async fn similarity_search(
        &self,
        vector: &[f32],
        limit: usize,
        threshold: f32,
        filters: &SearchFilters,
    ) -> Result<Vec<VectorSearchResult>> {
        let threshold = filters.min_score.map_or(threshold, |min| threshold.max(min));
        let capped = limit.min(self.max_results);
        if capped == 0 {
            return Ok(Vec::new());
        }

        let mut results = self
            .store
            .search(vector, capped, threshold, filters)
            .await
            .map_err(|e| {
                wrap(e, VectorSearchError::new("similarity_search", "").with_limit(limit).with_threshold(threshold))
            })?;

        results.retain(|r| r.similarity > threshold);
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(capped);

        debug!(
            "Similarity search returned {} results (limit: {}, threshold: {})",
            results.len(),
            capped,
            threshold
        );
        Ok(results)
    }

    /// Token-budgeted contexts for a generation call.
    ///
    /// Fetches `2 * limit` candidates and keeps the most relevant ones that
    /// fit `max_tokens`; the best candidate is always kept.
    pub async fn get_rag_contexts(
        &self,
        query_embedding: &[f32],
        limit: usize,
        threshold: f32,
        filters: &SearchFilters,
        max_tokens: usize,
    ) -> Result<Vec<RagContext>> {
        let candidates = self
            .similarity_search(query_embedding, limit.saturating_mul(2), threshold, filters)
            .await?;

        let candidates: Vec<RagContext> = candidates.into_iter().map(to_rag_context).collect();
        let selection = select_contexts(candidates, limit, max_tokens, &self.estimator);

        debug!(
            "Selected {} RAG contexts using ~{} of {} tokens",
            selection.contexts.len(),
            selection.total_tokens,
            max_tokens
        );
        Ok(selection.contexts)
    }

    /// Batched upsert of embedding rows, returning how many were written
    pub async fn store_embeddings(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let total = records.len();
        let mut records = records;

        while !records.is_empty() {
            let rest = records.split_off(records.len().min(STORE_BATCH));
            let batch = std::mem::replace(&mut records, rest);
            let first = batch.first().map(|r| r.content_id.clone());

            self.store.upsert(batch).await.map_err(|e| {
                let base = VectorSearchError::new("store_embeddings", "");
                wrap(e, match first { Some(id) => base.with_content(id), None => base })
            })?;
        }

        info!("Stored {} embeddings", total);
        Ok(total)
    }

    /// Overwrite one row
    pub async fn update_embedding(&self, record: VectorRecord) -> Result<()> {
        let content_id = record.content_id.clone();
        self.store
            .upsert(vec![record])
            .await
            .map_err(|e| wrap(e, VectorSearchError::new("update_embedding", "").with_content(content_id)))
    }

    /// Remove every row of the given content items
    pub async fn delete_embeddings(&self, content_ids: &[String]) -> Result<()> {
        if content_ids.is_empty() {
            return Ok(());
        }

        self.store
            .delete_by_content(content_ids)
            .await
            .map_err(|e| wrap(e, VectorSearchError::new("delete_embeddings", content_ids.join(","))))?;

        info!("Deleted embeddings for {} content items", content_ids.len());
        Ok(())
    }

    /// Content similar to a stored item, excluding the item itself
    pub async fn find_similar_content(
        &self,
        content_id: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<VectorSearchResult>> {
        let embedding = self.store.get_embedding(content_id).await.map_err(|e| {
            wrap(
                e,
                VectorSearchError::new("find_similar_content", "")
                    .with_content(content_id)
                    .with_limit(limit)
                    .with_threshold(threshold),
            )
        })?;

        let Some(embedding) = embedding else {
            warn!("No stored embedding for content {}", content_id);
            return Ok(Vec::new());
        };

        // Over-fetch: other chunks of the source document are dropped below
        let mut results = self
            .similarity_search(&embedding, limit.saturating_mul(2), threshold, &SearchFilters::default())
            .await?;

        results.retain(|r| r.content_id != content_id);
        results.truncate(limit);
        Ok(results)
    }

    /// Liveness of the underlying store
    pub async fn health(&self) -> bool {
        self.store.health().await.is_ok()
    }
}

/// Attach request parameters to a store failure
fn wrap(err: SearchError, base: VectorSearchError) -> SearchError {
    let message = match err {
        SearchError::VectorSearch(inner) => inner.message,
        other => other.to_string(),
    };
    let detail = if base.message.is_empty() {
        message
    } else {
        format!("{} ({})", message, base.message)
    };

    SearchError::VectorSearch(VectorSearchError { message: detail, ..base })
}

/// Convert a similarity hit into a generation context
pub fn to_rag_context(hit: VectorSearchResult) -> RagContext {
    let timestamp = hit
        .metadata
        .get(fields::CREATED_AT)
        .and_then(|v| v.as_i64())
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single());

    let metadata = RagContextMetadata {
        title: hit.metadata_str(fields::TITLE).map(str::to_string),
        course_id: hit.metadata_str(fields::COURSE_ID).map(str::to_string),
        module_id: hit.metadata_str(fields::MODULE_ID).map(str::to_string),
        section: hit.metadata_str("section").map(str::to_string),
        page: hit.metadata.get("page").and_then(|v| v.as_u64()).map(|p| p as u32),
        timestamp,
        content_id: hit.content_id,
        chunk_id: hit.chunk_id,
    };

    RagContext {
        text: hit.text,
        metadata,
        relevance_score: hit.similarity,
    }
}
