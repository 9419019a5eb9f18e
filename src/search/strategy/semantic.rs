//! Vector similarity retrieval over the expanded query text

use super::{SearchStrategy, StrategyOutput, VECTOR_KEY};
use crate::circuit_breaker::CircuitBreaker;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::observability::MetricsCollector;
use crate::search::models::{
    ContentType, ProcessedQuery, ResultSource, SearchResult, SourceKind, StrategyKind,
};
use crate::search::text::{extract_description, extract_highlights, extract_title};
use crate::vector_db::models::fields;
use crate::vector_db::{VectorSearchResult, VectorSearchService};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub struct SemanticStrategy {
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<VectorSearchService>,
    breaker: Arc<CircuitBreaker>,
    threshold: f32,
    metrics: Option<Arc<MetricsCollector>>,
}

impl SemanticStrategy {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<VectorSearchService>,
        breaker: Arc<CircuitBreaker>,
        threshold: f32,
    ) -> Self {
        Self {
            embedder,
            vectors,
            breaker,
            threshold,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl SearchStrategy for SemanticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Semantic
    }

    fn priority(&self) -> i32 {
        20
    }

    fn can_handle(&self, query: &ProcessedQuery) -> bool {
        matches!(query.strategy, StrategyKind::Semantic | StrategyKind::Hybrid)
    }

    async fn search(&self, query: &ProcessedQuery) -> Result<StrategyOutput> {
        let hits = self
            .breaker
            .execute_with_fallback(
                VECTOR_KEY,
                || async {
                    let embedding = self.embedder.embed_single(&query.expanded_query).await?;
                    let hits = self
                        .vectors
                        .similarity_search(&embedding, query.candidate_window(), self.threshold, &query.filters)
                        .await?;
                    Ok(Some(hits))
                },
                || async { None },
            )
            .await?;

        let Some(hits) = hits else {
            if let Some(metrics) = &self.metrics {
                metrics.record_fallback();
            }
            return Ok(StrategyOutput::fallback());
        };

        let results: Vec<SearchResult> = hits
            .into_iter()
            .map(|hit| to_search_result(hit, query))
            .collect();

        debug!(
            search_id = %query.search_id,
            "Semantic strategy produced {} results above {}",
            results.len(),
            self.threshold
        );
        Ok(StrategyOutput::from_results(results))
    }
}

/// Shape a vector hit like an engine hit, deriving missing fields from its text
pub fn to_search_result(hit: VectorSearchResult, query: &ProcessedQuery) -> SearchResult {
    let title = hit
        .metadata_str(fields::TITLE)
        .map(str::to_string)
        .unwrap_or_else(|| extract_title(&hit.text));
    let content_type = hit
        .metadata_str(fields::CONTENT_TYPE)
        .map(ContentType::parse_lenient)
        .unwrap_or_default();
    let highlights = if query.options.include_highlights {
        extract_highlights(&hit.text, &query.tokens)
    } else {
        Vec::new()
    };
    let created_at = hit
        .metadata
        .get(fields::CREATED_AT)
        .and_then(|v| v.as_i64())
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(Utc::now);

    let mut source = ResultSource::new(SourceKind::Vector, hit.content_id.clone());
    source.metadata.insert("similarity".to_string(), json!(hit.similarity));
    if let Some(chunk_id) = &hit.chunk_id {
        source.metadata.insert("chunkId".to_string(), json!(chunk_id));
    }

    SearchResult {
        id: hit.id.clone(),
        content_type,
        title,
        description: extract_description(&hit.text),
        highlights,
        score: hit.similarity,
        relevance_score: hit.similarity,
        semantic_score: Some(hit.similarity),
        source,
        course_id: hit.metadata_str(fields::COURSE_ID).map(str::to_string),
        module_id: hit.metadata_str(fields::MODULE_ID).map(str::to_string),
        tags: hit.metadata_strings(fields::TAGS),
        categories: hit.metadata_strings(fields::CATEGORIES),
        created_at,
        updated_at: created_at,
        content: Some(hit.text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::config::SearchConfig;
    use crate::error::EmbeddingError;
    use crate::search::models::SearchRequest;
    use crate::search::query_processor::QueryProcessor;
    use crate::vector_db::{InMemoryVectorStore, VectorRecord};
    use std::collections::HashMap;

    struct AxisEmbedder;

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedder {
        async fn embed_single(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn embedding_dimension(&self) -> usize {
            2
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedder {
        async fn embed_single(&self, _text: &str) -> Result<Vec<f32>> {
            Err(EmbeddingError::ApiError("503 Service Unavailable".to_string()).into())
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(EmbeddingError::ApiError("503 Service Unavailable".to_string()).into())
        }

        fn embedding_dimension(&self) -> usize {
            2
        }
    }

    async fn vectors() -> Arc<VectorSearchService> {
        let store = Arc::new(InMemoryVectorStore::new());
        let service = VectorSearchService::new(store, 100);
        service
            .store_embeddings(vec![
                VectorRecord::new(
                    "ml-101",
                    "intro. Machine learning finds patterns in data. Models learn from examples.",
                    vec![1.0, 0.1],
                )
                .with_metadata(fields::CONTENT_TYPE, json!("lesson"))
                .with_metadata(fields::TAGS, json!(["ml"])),
                VectorRecord::new("cooking", "Bread needs flour and water.", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        Arc::new(service)
    }

    async fn query() -> ProcessedQuery {
        QueryProcessor::new(SearchConfig::default())
            .process(SearchRequest::new("machine learning").with_strategy(StrategyKind::Semantic))
            .await
            .unwrap()
    }

    fn breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()))
    }

    #[tokio::test]
    async fn test_semantic_results_are_shaped_from_text() {
        let strategy = SemanticStrategy::new(Arc::new(AxisEmbedder), vectors().await, breaker(), 0.7);
        let output = strategy.search(&query().await).await.unwrap();

        assert_eq!(output.results.len(), 1);
        let result = &output.results[0];
        assert_eq!(result.source.id, "ml-101");
        assert_eq!(result.source.kind, SourceKind::Vector);
        assert_eq!(result.content_type, ContentType::Lesson);
        assert_eq!(result.title, "Machine learning finds patterns in data");
        assert_eq!(result.tags, vec!["ml"]);
        assert_eq!(result.semantic_score, Some(result.score));
        assert!(result.highlights[0].contains("<em>Machine</em> <em>learning</em>"));
    }

    #[tokio::test]
    async fn test_embedding_outage_degrades() {
        let strategy = SemanticStrategy::new(Arc::new(DownEmbedder), vectors().await, breaker(), 0.7);
        let output = strategy.search(&query().await).await.unwrap();
        assert!(output.degraded);
        assert!(output.results.is_empty());
    }

    #[test]
    fn test_title_prefers_metadata() {
        let mut metadata = HashMap::new();
        metadata.insert(fields::TITLE.to_string(), json!("Stored Title"));
        let hit = VectorSearchResult {
            id: "p1".to_string(),
            content_id: "c1".to_string(),
            chunk_id: Some("2".to_string()),
            text: "Some body text that is long enough.".to_string(),
            similarity: 0.9,
            metadata,
        };
        let query = ProcessedQuery {
            original_query: "body".to_string(),
            expanded_query: "body".to_string(),
            tokens: vec!["body".to_string()],
            strategy: StrategyKind::Semantic,
            filters: Default::default(),
            options: Default::default(),
            context: Default::default(),
            search_id: uuid::Uuid::new_v4(),
            limit: 10,
        };

        let result = to_search_result(hit, &query);
        assert_eq!(result.title, "Stored Title");
        assert_eq!(result.dedup_key(), ("c1".to_string(), Some("2".to_string())));
    }
}
