//! Retrieval-augmented answers
//!
//! Failures never leave this strategy as errors. A query without usable
//! contexts gets an explanatory result, and a failed embedding or
//! generation call gets a single error result, so a hybrid request that
//! also asked for an answer still returns its other results.

use super::{SearchStrategy, StrategyOutput, RAG_KEY, VECTOR_KEY};
use crate::circuit_breaker::CircuitBreaker;
use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result, SearchError};
use crate::generation::{GenerationOptions, GenerationProvider};
use crate::observability::MetricsCollector;
use crate::rag::{RagContext, RagResponse};
use crate::search::models::{
    ContentType, ProcessedQuery, ResultSource, SearchResult, SourceKind, StrategyKind,
};
use crate::search::text::{extract_description, extract_title, truncate_at_word, DESCRIPTION_CHARS};
use crate::vector_db::VectorSearchService;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ANSWER_TITLE: &str = "AI-Generated Answer";
pub const NO_CONTEXT_TITLE: &str = "No Relevant Information Found";
pub const ERROR_TITLE: &str = "Search Error";
/// Score of the explanatory result served when nothing relevant was found
pub const NO_CONTEXT_SCORE: f32 = 0.1;

pub struct RagStrategy {
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<VectorSearchService>,
    generator: Arc<dyn GenerationProvider>,
    breaker: Arc<CircuitBreaker>,
    config: RagConfig,
    options: GenerationOptions,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RagStrategy {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<VectorSearchService>,
        generator: Arc<dyn GenerationProvider>,
        breaker: Arc<CircuitBreaker>,
        config: RagConfig,
        options: GenerationOptions,
    ) -> Self {
        Self {
            embedder,
            vectors,
            generator,
            breaker,
            config,
            options,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn answer(&self, query: &ProcessedQuery) -> Result<StrategyOutput> {
        let contexts = self
            .breaker
            .execute(VECTOR_KEY, || async {
                let embedding = self.embedder.embed_single(&query.expanded_query).await?;
                self.vectors
                    .get_rag_contexts(
                        &embedding,
                        self.config.max_contexts,
                        self.config.similarity_threshold,
                        &query.filters,
                        self.config.max_context_tokens,
                    )
                    .await
            })
            .await?;

        if contexts.is_empty() {
            info!(
                search_id = %query.search_id,
                "No contexts above {} for RAG query",
                self.config.similarity_threshold
            );
            return Ok(StrategyOutput::from_results(vec![no_context_result(query)]));
        }

        debug!(search_id = %query.search_id, "Generating answer from {} contexts", contexts.len());
        let response = self
            .breaker
            .execute(RAG_KEY, || {
                self.generator
                    .generate(&query.original_query, &contexts, &self.options)
            })
            .await?;

        let low_confidence = response.confidence < self.config.low_confidence_threshold;
        if low_confidence {
            warn!(
                search_id = %query.search_id,
                "Low confidence answer ({:.2}) from {}",
                response.confidence,
                response.model
            );
        }

        let mut results = vec![answer_result(query, &response, low_confidence)];
        results.extend(
            response
                .sources
                .iter()
                .take(self.config.max_source_results)
                .map(source_result),
        );

        Ok(StrategyOutput {
            results,
            facets: None,
            rag_response: Some(response),
            degraded: false,
        })
    }
}

#[async_trait]
impl SearchStrategy for RagStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Rag
    }

    fn priority(&self) -> i32 {
        30
    }

    fn can_handle(&self, query: &ProcessedQuery) -> bool {
        query.strategy == StrategyKind::Rag || query.options.include_rag
    }

    async fn search(&self, query: &ProcessedQuery) -> Result<StrategyOutput> {
        match self.answer(query).await {
            Ok(output) => Ok(output),
            Err(e) => {
                warn!(search_id = %query.search_id, "RAG strategy failed: {}", e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_fallback();
                }
                Ok(StrategyOutput {
                    results: vec![error_result(query, &e)],
                    degraded: true,
                    ..Default::default()
                })
            }
        }
    }
}

fn rag_source(query: &ProcessedQuery) -> ResultSource {
    ResultSource::new(SourceKind::Rag, format!("rag-{}", query.search_id))
}

fn no_context_result(query: &ProcessedQuery) -> SearchResult {
    let now = Utc::now();
    let mut source = rag_source(query);
    source
        .metadata
        .insert("reason".to_string(), json!(RagError::NoContexts.to_string()));

    SearchResult {
        id: source.id.clone(),
        content_type: ContentType::AiAnswer,
        title: NO_CONTEXT_TITLE.to_string(),
        description: "No content relevant enough to answer this question was found. \
            Try rephrasing or broadening the query."
            .to_string(),
        content: None,
        highlights: Vec::new(),
        score: NO_CONTEXT_SCORE,
        relevance_score: NO_CONTEXT_SCORE,
        semantic_score: None,
        source,
        course_id: None,
        module_id: None,
        tags: Vec::new(),
        categories: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

fn error_result(query: &ProcessedQuery, err: &SearchError) -> SearchResult {
    let now = Utc::now();
    let mut source = rag_source(query);
    source.metadata.insert("error".to_string(), json!(err.to_string()));

    SearchResult {
        id: source.id.clone(),
        content_type: ContentType::AiAnswer,
        title: ERROR_TITLE.to_string(),
        description: "An answer could not be generated for this query.".to_string(),
        content: None,
        highlights: Vec::new(),
        score: 0.0,
        relevance_score: 0.0,
        semantic_score: None,
        source,
        course_id: None,
        module_id: None,
        tags: Vec::new(),
        categories: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

fn answer_result(query: &ProcessedQuery, response: &RagResponse, low_confidence: bool) -> SearchResult {
    let now = Utc::now();
    let mut source = rag_source(query);
    source.metadata.insert("model".to_string(), json!(response.model));
    source.metadata.insert("confidence".to_string(), json!(response.confidence));
    source.metadata.insert("sourceCount".to_string(), json!(response.sources.len()));
    if low_confidence {
        source.metadata.insert("lowConfidence".to_string(), json!(true));
    }

    SearchResult {
        id: source.id.clone(),
        content_type: ContentType::AiAnswer,
        title: ANSWER_TITLE.to_string(),
        description: truncate_at_word(&response.answer, DESCRIPTION_CHARS),
        content: Some(response.answer.clone()),
        highlights: Vec::new(),
        score: response.confidence,
        relevance_score: response.confidence,
        semantic_score: None,
        source,
        course_id: None,
        module_id: None,
        tags: Vec::new(),
        categories: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

/// A cited passage surfaced for click-through
fn source_result(context: &RagContext) -> SearchResult {
    let metadata = &context.metadata;
    let created_at = metadata.timestamp.unwrap_or_else(Utc::now);

    let mut source = ResultSource::new(SourceKind::Rag, metadata.content_id.clone());
    source.metadata.insert("citation".to_string(), json!(true));
    if let Some(chunk_id) = &metadata.chunk_id {
        source.metadata.insert("chunkId".to_string(), json!(chunk_id));
    }

    let id = match &metadata.chunk_id {
        Some(chunk_id) => format!("{}#{}", metadata.content_id, chunk_id),
        None => metadata.content_id.clone(),
    };

    SearchResult {
        id,
        content_type: ContentType::Document,
        title: metadata
            .title
            .clone()
            .unwrap_or_else(|| extract_title(&context.text)),
        description: extract_description(&context.text),
        content: Some(context.text.clone()),
        highlights: Vec::new(),
        score: context.relevance_score,
        relevance_score: context.relevance_score,
        semantic_score: Some(context.relevance_score),
        source,
        course_id: metadata.course_id.clone(),
        module_id: metadata.module_id.clone(),
        tags: Vec::new(),
        categories: Vec::new(),
        created_at,
        updated_at: created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::config::SearchConfig;
    use crate::search::models::{SearchOptions, SearchRequest};
    use crate::search::query_processor::QueryProcessor;
    use crate::vector_db::{InMemoryVectorStore, VectorRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};

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

    struct CannedGenerator {
        confidence: f32,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerationProvider for CannedGenerator {
        async fn generate(
            &self,
            _question: &str,
            contexts: &[RagContext],
            options: &GenerationOptions,
        ) -> Result<RagResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RagError::Generation("model overloaded".to_string()).into());
            }
            Ok(RagResponse {
                answer: "Machine learning fits models to data.".to_string(),
                sources: contexts.to_vec(),
                confidence: self.confidence,
                model: options.model.clone(),
                reasoning: None,
                follow_up_questions: Vec::new(),
            })
        }
    }

    fn generator(confidence: f32, fail: bool) -> Arc<CannedGenerator> {
        Arc::new(CannedGenerator {
            confidence,
            fail,
            calls: AtomicUsize::new(0),
        })
    }

    async fn vectors(records: Vec<VectorRecord>) -> Arc<VectorSearchService> {
        let service = VectorSearchService::new(Arc::new(InMemoryVectorStore::new()), 100);
        service.store_embeddings(records).await.unwrap();
        Arc::new(service)
    }

    fn relevant_records() -> Vec<VectorRecord> {
        (0..7)
            .map(|i| {
                VectorRecord::new(
                    format!("doc-{}", i),
                    format!("Passage {} about gradient descent and loss functions.", i),
                    vec![1.0, i as f32 * 0.05],
                )
            })
            .collect()
    }

    fn strategy(vectors: Arc<VectorSearchService>, generator: Arc<CannedGenerator>) -> RagStrategy {
        let options = GenerationOptions {
            model: "answer-model".to_string(),
            temperature: 0.2,
            max_tokens: 512,
            include_reasoning: false,
            include_follow_ups: false,
        };
        RagStrategy::new(
            Arc::new(AxisEmbedder),
            vectors,
            generator,
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
            RagConfig::default(),
            options,
        )
    }

    async fn rag_query() -> ProcessedQuery {
        QueryProcessor::new(SearchConfig::default())
            .process(SearchRequest::new("how does gradient descent work").with_strategy(StrategyKind::Rag))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_activation() {
        let s = strategy(vectors(Vec::new()).await, generator(0.9, false));
        assert!(s.can_handle(&rag_query().await));

        let processor = QueryProcessor::new(SearchConfig::default());
        let hybrid = processor.process(SearchRequest::new("rust")).await.unwrap();
        assert!(!s.can_handle(&hybrid));

        let with_answer = processor
            .process(SearchRequest::new("rust").with_options(SearchOptions {
                include_rag: true,
                ..Default::default()
            }))
            .await
            .unwrap();
        assert!(s.can_handle(&with_answer));
    }

    #[tokio::test]
    async fn test_zero_contexts_yields_explanatory_result() {
        let far = vec![VectorRecord::new("cooking", "Bread needs flour.", vec![0.0, 1.0])];
        let gen = generator(0.9, false);
        let output = strategy(vectors(far).await, gen.clone())
            .search(&rag_query().await)
            .await
            .unwrap();

        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].title, NO_CONTEXT_TITLE);
        assert_eq!(output.results[0].score, NO_CONTEXT_SCORE);
        assert!(output.rag_response.is_none());
        assert!(!output.degraded);
        assert_eq!(gen.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_answer_with_capped_sources() {
        let output = strategy(vectors(relevant_records()).await, generator(0.85, false))
            .search(&rag_query().await)
            .await
            .unwrap();

        let answer = &output.results[0];
        assert_eq!(answer.title, ANSWER_TITLE);
        assert_eq!(answer.content_type, ContentType::AiAnswer);
        assert_eq!(answer.score, 0.85);
        assert!(!answer.source.metadata.contains_key("lowConfidence"));

        // five contexts by default, each cited
        assert_eq!(output.results.len(), 6);
        assert!(output.results[1..].iter().all(|r| r.source.kind == SourceKind::Rag));
        assert_eq!(output.rag_response.unwrap().model, "answer-model");
    }

    #[tokio::test]
    async fn test_low_confidence_is_flagged() {
        let output = strategy(vectors(relevant_records()).await, generator(0.2, false))
            .search(&rag_query().await)
            .await
            .unwrap();
        assert_eq!(output.results[0].source.metadata["lowConfidence"], json!(true));
    }

    #[tokio::test]
    async fn test_generation_failure_becomes_error_result() {
        let output = strategy(vectors(relevant_records()).await, generator(0.9, true))
            .search(&rag_query().await)
            .await
            .unwrap();

        assert!(output.degraded);
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].title, ERROR_TITLE);
        assert!(output.rag_response.is_none());
    }
}
