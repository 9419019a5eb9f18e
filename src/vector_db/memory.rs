//! Brute-force in-process vector store

use super::models::{payload_matches, VectorRecord, VectorSearchResult};
use super::VectorStore;
use crate::error::{Result, VectorSearchError};
use crate::search::models::SearchFilters;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Cosine similarity of two vectors, 0 when either is degenerate
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Vector store kept entirely in memory. Suitable for tests and small
/// single-node corpora.
pub struct InMemoryVectorStore {
    rows: DashMap<Uuid, VectorRecord>,
    dimension: Option<usize>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            dimension: None,
        }
    }

    /// Reject rows whose vectors do not have `dimension` entries
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        threshold: f32,
        filters: &SearchFilters,
    ) -> Result<Vec<VectorSearchResult>> {
        let mut hits: Vec<VectorSearchResult> = self
            .rows
            .iter()
            .filter_map(|row| {
                let record = row.value();
                let payload = record.payload();
                if !payload_matches(filters, &payload) {
                    return None;
                }

                let similarity = cosine_similarity(vector, &record.embedding).max(0.0);
                if similarity < threshold {
                    return None;
                }

                let payload: HashMap<_, _> = payload.into_iter().collect();
                VectorSearchResult::from_payload(row.key().to_string(), similarity, payload)
            })
            .collect();

        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(limit);

        debug!("In-memory vector search returned {} hits", hits.len());
        Ok(hits)
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        for record in records {
            if let Some(dimension) = self.dimension {
                if record.embedding.len() != dimension {
                    return Err(VectorSearchError::new(
                        "upsert",
                        format!("expected {} dimensions, got {}", dimension, record.embedding.len()),
                    )
                    .with_content(record.content_id.clone())
                    .into());
                }
            }
            self.rows.insert(record.point_id(), record);
        }
        Ok(())
    }

    async fn delete_by_content(&self, content_ids: &[String]) -> Result<()> {
        self.rows
            .retain(|_, record| !content_ids.iter().any(|id| id == &record.content_id));
        Ok(())
    }

    async fn get_embedding(&self, content_id: &str) -> Result<Option<Vec<f32>>> {
        let first = self
            .rows
            .iter()
            .filter(|row| row.value().content_id == content_id)
            .min_by(|a, b| a.value().chunk_id.cmp(&b.value().chunk_id))
            .map(|row| row.value().embedding.clone());
        Ok(first)
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}
