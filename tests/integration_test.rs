//! Integration tests for the retrieval core
//!
//! Every backend is replaced by an in-process stand-in so the whole
//! pipeline runs: validation, caching, concurrent strategies, circuit
//! breaking, fusion and the auxiliary operations.

use async_trait::async_trait;
use chrono::Utc;
use retrieval_core::{
    cache::{CacheManager, InMemoryDistributedCache},
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    config::{CacheConfig, RagConfig, SearchConfig},
    embedding::EmbeddingProvider,
    error::{EngineError, RagError, Result, SearchError, ValidationError},
    fulltext::{EngineHealth, EngineQuery, EngineResponse, FullTextEngine},
    generation::{GenerationOptions, GenerationProvider},
    observability::{HealthStatus, MetricsCollector},
    rag::{RagContext, RagResponse},
    search::{
        models::{ResultSource, SourceKind},
        strategy::{rag::NO_CONTEXT_TITLE, rag::NO_CONTEXT_SCORE, ENGINE_KEY},
        ClickThroughEvent, ContentType, FullTextStrategy, RagStrategy, SearchOptions, SearchRequest,
        SearchResult, SearchService, SearchStrategy, SemanticStrategy, StrategyExecutor, StrategyKind,
        Suggestion,
    },
    vector_db::{InMemoryVectorStore, VectorRecord, VectorSearchService},
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone, Copy)]
enum EngineMode {
    Healthy,
    TimingOut,
    MissingIndex,
    Hanging,
}

struct MockEngine {
    mode: EngineMode,
    searches: AtomicUsize,
    suggests: AtomicUsize,
    last_size: AtomicUsize,
}

impl MockEngine {
    fn new(mode: EngineMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            searches: AtomicUsize::new(0),
            suggests: AtomicUsize::new(0),
            last_size: AtomicUsize::new(0),
        })
    }
}

fn keyword_result(id: &str, score: f32) -> SearchResult {
    let now = Utc::now();
    SearchResult {
        id: id.to_string(),
        content_type: ContentType::Lesson,
        title: format!("Lesson {}", id),
        description: "Ownership rules and the borrow checker.".to_string(),
        content: None,
        highlights: vec!["<em>ownership</em> rules".to_string()],
        score,
        relevance_score: score,
        semantic_score: None,
        source: ResultSource::new(SourceKind::FullText, id),
        course_id: Some("rust-101".to_string()),
        module_id: None,
        tags: vec!["rust".to_string()],
        categories: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl FullTextEngine for MockEngine {
    async fn search(&self, query: &EngineQuery) -> Result<EngineResponse> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.last_size.store(query.size, Ordering::SeqCst);
        match self.mode {
            EngineMode::Healthy => Ok(EngineResponse {
                results: vec![keyword_result("kw-1", 1.0), keyword_result("kw-2", 0.6)],
                total: 2,
                facets: None,
                took_ms: 3,
            }),
            EngineMode::TimingOut => Err(EngineError::Timeout.into()),
            EngineMode::MissingIndex => Err(EngineError::IndexNotFound("content".to_string()).into()),
            EngineMode::Hanging => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(EngineResponse::default())
            }
        }
    }

    async fn suggest(&self, partial: &str, kind: Option<&str>, limit: usize) -> Result<Vec<Suggestion>> {
        self.suggests.fetch_add(1, Ordering::SeqCst);
        Ok((0..limit.min(8))
            .map(|i| Suggestion {
                text: format!("{} topic {}", partial, i),
                kind: kind.map(str::to_string),
                score: 1.0 - i as f32 * 0.1,
            })
            .collect())
    }

    async fn health(&self) -> Result<EngineHealth> {
        Ok(EngineHealth {
            status: "green".to_string(),
            number_of_nodes: 1,
        })
    }
}

/// Embeds every text onto the same axis
struct MockEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed_single(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![1.0, 0.0])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }

    fn embedding_dimension(&self) -> usize {
        2
    }
}

struct MockGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl GenerationProvider for MockGenerator {
    async fn generate(
        &self,
        _question: &str,
        contexts: &[RagContext],
        options: &GenerationOptions,
    ) -> Result<RagResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if contexts.is_empty() {
            return Err(RagError::NoContexts.into());
        }
        Ok(RagResponse {
            answer: "Each value has a single owner.".to_string(),
            sources: contexts.to_vec(),
            confidence: 0.85,
            model: options.model.clone(),
            reasoning: None,
            follow_up_questions: Vec::new(),
        })
    }
}

struct Harness {
    service: SearchService,
    engine: Arc<MockEngine>,
    embedder: Arc<MockEmbedder>,
    generator: Arc<MockGenerator>,
    breaker: Arc<CircuitBreaker>,
}

struct HarnessOptions {
    engine: EngineMode,
    records: Vec<VectorRecord>,
    breaker: CircuitBreakerConfig,
    strategy_timeout_ms: u64,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            engine: EngineMode::Healthy,
            records: aligned_records(),
            breaker: CircuitBreakerConfig::default(),
            strategy_timeout_ms: 2_000,
        }
    }
}

/// Passages close to the query axis
fn aligned_records() -> Vec<VectorRecord> {
    vec![
        VectorRecord::new(
            "vec-1",
            "Ownership moves a value unless the type is Copy. Borrowing lends access without moving.",
            vec![1.0, 0.05],
        )
        .with_metadata("title", serde_json::json!("Ownership in depth")),
        VectorRecord::new(
            "kw-1",
            "The borrow checker enforces that references never outlive their owner.",
            vec![1.0, 0.1],
        ),
    ]
}

async fn harness(options: HarnessOptions) -> Harness {
    let engine = MockEngine::new(options.engine);
    let embedder = Arc::new(MockEmbedder {
        calls: AtomicUsize::new(0),
    });
    let generator = Arc::new(MockGenerator {
        calls: AtomicUsize::new(0),
    });
    let breaker = Arc::new(CircuitBreaker::new(options.breaker));

    let vectors = VectorSearchService::new(Arc::new(InMemoryVectorStore::new()), 100);
    vectors.store_embeddings(options.records).await.unwrap();
    let vectors = Arc::new(vectors);

    let generation_options = GenerationOptions {
        model: "answer-model".to_string(),
        temperature: 0.2,
        max_tokens: 256,
        include_reasoning: false,
        include_follow_ups: false,
    };

    let rag_config = RagConfig::default();
    let strategies: Vec<Arc<dyn SearchStrategy>> = vec![
        Arc::new(FullTextStrategy::new(engine.clone(), breaker.clone())),
        Arc::new(SemanticStrategy::new(
            embedder.clone(),
            vectors.clone(),
            breaker.clone(),
            rag_config.similarity_threshold,
        )),
        Arc::new(RagStrategy::new(
            embedder.clone(),
            vectors,
            generator.clone(),
            breaker.clone(),
            rag_config,
            generation_options,
        )),
    ];

    let search_config = SearchConfig {
        strategy_timeout_ms: options.strategy_timeout_ms,
        ..Default::default()
    };
    let metrics = Arc::new(MetricsCollector::new());
    let executor = StrategyExecutor::new(strategies, search_config.strategy_timeout())
        .with_metrics(metrics.clone());
    let cache = Arc::new(
        CacheManager::new(CacheConfig::default(), Arc::new(InMemoryDistributedCache::new()))
            .with_metrics(metrics.clone()),
    );

    let service = SearchService::new(search_config, executor, engine.clone(), cache, breaker.clone())
        .with_metrics(metrics);

    Harness {
        service,
        engine,
        embedder,
        generator,
        breaker,
    }
}

fn click(result_id: &str) -> ClickThroughEvent {
    ClickThroughEvent {
        search_id: Uuid::new_v4(),
        result_id: result_id.to_string(),
        position: 0,
        query: Some("ownership".to_string()),
        user_id: None,
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn test_hybrid_search_fuses_both_backends() {
    let h = harness(HarnessOptions::default()).await;
    let response = h.service.search(SearchRequest::new("rust ownership")).await.unwrap();

    // kw-1 comes back from both backends and is kept once
    assert_eq!(response.total_results, 3);
    let ids: Vec<&str> = response.results.iter().map(|r| r.source.id.as_str()).collect();
    assert_eq!(ids.iter().filter(|id| **id == "kw-1").count(), 1);
    assert!(ids.contains(&"vec-1"));
    assert!(ids.contains(&"kw-2"));

    for pair in response.results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(response.rag_response.is_none());
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_repeated_search_is_served_from_cache() {
    let h = harness(HarnessOptions::default()).await;
    let request = SearchRequest::new("rust ownership");

    let first = h.service.search(request.clone()).await.unwrap();
    let engine_calls = h.engine.searches.load(Ordering::SeqCst);
    let embed_calls = h.embedder.calls.load(Ordering::SeqCst);

    let second = h.service.search(request).await.unwrap();

    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
    assert_eq!(h.engine.searches.load(Ordering::SeqCst), engine_calls);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), embed_calls);
}

#[tokio::test]
async fn test_cache_key_ignores_case_and_spacing() {
    let h = harness(HarnessOptions::default()).await;

    h.service.search(SearchRequest::new("Rust Ownership")).await.unwrap();
    h.service.search(SearchRequest::new("  rust   ownership ")).await.unwrap();

    assert_eq!(h.engine.searches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_second_page_continues_first_page_ordering() {
    let h = harness(HarnessOptions::default()).await;
    let paged = |page: usize, limit: usize| {
        SearchRequest::new("rust ownership").with_options(SearchOptions {
            page,
            limit: Some(limit),
            ..Default::default()
        })
    };

    let full = h.service.search(paged(1, 10)).await.unwrap();
    let ordering: Vec<String> = full.results.iter().map(|r| r.source.id.clone()).collect();
    assert_eq!(ordering.len(), 3);

    let first = h.service.search(paged(1, 2)).await.unwrap();
    assert_eq!(h.engine.last_size.load(Ordering::SeqCst), 2);

    let second = h.service.search(paged(2, 2)).await.unwrap();
    // Page two needs the top four candidates from every backend
    assert_eq!(h.engine.last_size.load(Ordering::SeqCst), 4);

    let first_ids: Vec<String> = first.results.iter().map(|r| r.source.id.clone()).collect();
    let second_ids: Vec<String> = second.results.iter().map(|r| r.source.id.clone()).collect();
    assert_eq!(first_ids, ordering[..2].to_vec());
    assert_eq!(second_ids, ordering[2..].to_vec());
    assert!(second_ids.iter().all(|id| !first_ids.contains(id)));

    assert_eq!(first.total_results, 3);
    assert_eq!(second.total_results, 3);
}

#[tokio::test]
async fn test_page_past_result_window_is_rejected() {
    let h = harness(HarnessOptions::default()).await;
    let request = SearchRequest::new("rust ownership").with_options(SearchOptions {
        page: usize::MAX / 2,
        ..Default::default()
    });

    let err = h.service.search(request).await.unwrap_err();
    assert!(matches!(
        err,
        SearchError::Validation(ValidationError::PageOutOfRange { .. })
    ));
    assert_eq!(h.engine.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_breaker_opens_after_threshold_and_skips_engine() {
    let h = harness(HarnessOptions {
        engine: EngineMode::TimingOut,
        breaker: CircuitBreakerConfig {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
            call_timeout: Some(Duration::from_secs(5)),
        },
        ..Default::default()
    })
    .await;

    for _ in 0..3 {
        let response = h
            .service
            .search(SearchRequest::new("rust ownership").with_strategy(StrategyKind::FullText))
            .await
            .unwrap();
        assert!(response.results.is_empty());
    }
    assert_eq!(h.engine.searches.load(Ordering::SeqCst), 3);
    assert_eq!(h.breaker.state(ENGINE_KEY), CircuitState::Open);

    let response = h
        .service
        .search(SearchRequest::new("rust ownership").with_strategy(StrategyKind::FullText))
        .await
        .unwrap();
    assert!(response.results.is_empty());
    assert_eq!(h.engine.searches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_rag_without_contexts_explains_itself() {
    let h = harness(HarnessOptions {
        records: vec![VectorRecord::new("bread", "Bread needs flour and water.", vec![0.0, 1.0])],
        ..Default::default()
    })
    .await;

    let response = h
        .service
        .search(SearchRequest::new("what is ownership").with_strategy(StrategyKind::Rag))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].title, NO_CONTEXT_TITLE);
    assert_eq!(response.results[0].score, NO_CONTEXT_SCORE);
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.engine.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rag_answer_with_cited_sources() {
    let h = harness(HarnessOptions::default()).await;

    let response = h
        .service
        .search(SearchRequest::new("what is ownership").with_strategy(StrategyKind::Rag))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 3);
    let answers: Vec<_> = response
        .results
        .iter()
        .filter(|r| r.content_type == ContentType::AiAnswer)
        .collect();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].score, 0.85);
    assert!(response
        .results
        .iter()
        .all(|r| r.source.kind == SourceKind::Rag));
    let rag = response.rag_response.unwrap();
    assert_eq!(rag.sources.len(), 2);
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let h = harness(HarnessOptions::default()).await;

    let err = h.service.search(SearchRequest::new("a")).await.unwrap_err();
    assert!(matches!(
        err,
        SearchError::Validation(ValidationError::QueryTooShort { length: 1, min: 2 })
    ));

    let err = h
        .service
        .search(SearchRequest::new("rust").with_options(SearchOptions {
            limit: Some(500),
            ..Default::default()
        }))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    assert_eq!(h.engine.searches.load(Ordering::SeqCst), 0);
    assert_eq!(h.service.metrics().get_metrics().validation_errors, 2);
}

#[tokio::test]
async fn test_failing_strategy_does_not_fail_search() {
    let h = harness(HarnessOptions {
        engine: EngineMode::MissingIndex,
        ..Default::default()
    })
    .await;

    let response = h.service.search(SearchRequest::new("rust ownership")).await.unwrap();

    assert_eq!(response.results.len(), 2);
    assert!(response
        .results
        .iter()
        .all(|r| r.source.kind == SourceKind::Vector));
    assert_eq!(h.service.metrics().get_metrics().strategy_failures, 1);
    // missing index is an answer, not an outage
    assert_eq!(h.breaker.state(ENGINE_KEY), CircuitState::Closed);
}

#[tokio::test]
async fn test_hanging_strategy_is_bounded() {
    let h = harness(HarnessOptions {
        engine: EngineMode::Hanging,
        strategy_timeout_ms: 200,
        ..Default::default()
    })
    .await;

    let started = std::time::Instant::now();
    let response = h.service.search(SearchRequest::new("rust ownership")).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(response.results.len(), 2);
    assert_eq!(h.service.metrics().get_metrics().strategy_failures, 1);

    // degraded responses are not cached
    h.service.search(SearchRequest::new("rust ownership")).await.unwrap();
    assert_eq!(h.engine.searches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_suggestions_are_cached_and_truncated() {
    let h = harness(HarnessOptions::default()).await;

    let first = h.service.get_suggestions("own", None, Some(3)).await.unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first[0].text, "own topic 0");

    let second = h.service.get_suggestions("OWN", None, Some(5)).await.unwrap();
    assert_eq!(second.len(), 5);
    assert_eq!(h.engine.suggests.load(Ordering::SeqCst), 1);

    assert!(h.service.get_suggestions("  ", None, None).await.is_err());
    assert!(h.service.get_suggestions("own", None, Some(0)).await.is_err());
}

#[tokio::test]
async fn test_popular_searches_and_clicks() {
    let h = harness(HarnessOptions::default()).await;

    h.service.search(SearchRequest::new("rust ownership")).await.unwrap();
    h.service.search(SearchRequest::new("Rust ownership")).await.unwrap();
    h.service.search(SearchRequest::new("async runtimes")).await.unwrap();

    let popular = h.service.get_popular_searches(1).await;
    assert_eq!(popular.len(), 1);
    assert_eq!(popular[0].query, "rust ownership");
    assert_eq!(popular[0].count, 2);

    h.service.track_click_through(click("kw-1")).await.unwrap();
    h.service.track_click_through(click("kw-1")).await.unwrap();
    assert_eq!(h.service.analytics().click_count("kw-1"), 2);
    assert_eq!(h.service.metrics().get_metrics().click_throughs, 2);

    assert!(h.service.track_click_through(click(" ")).await.is_err());
}

#[tokio::test]
async fn test_clear_cache_forces_fresh_search() {
    let h = harness(HarnessOptions::default()).await;

    h.service.search(SearchRequest::new("rust ownership")).await.unwrap();
    assert!(h.service.clear_cache(None).await > 0);

    h.service.search(SearchRequest::new("rust ownership")).await.unwrap();
    assert_eq!(h.engine.searches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_health_report() {
    let h = harness(HarnessOptions::default()).await;

    let report = h.service.get_health().await;
    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(report.engine);
    assert!(report.cache);
    assert_eq!(report.circuit_breaker, CircuitState::Closed);
}
