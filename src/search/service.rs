//! Search orchestrator: the entry point for every exposed operation

use super::analytics::SearchAnalytics;
use super::executor::StrategyExecutor;
use super::fusion::{fuse, FusedResults};
use super::models::{
    ClickThroughEvent, PopularSearch, ProcessedQuery, SearchFilters, SearchOptions, SearchRequest,
    SearchResponse, StrategyKind, Suggestion,
};
use super::query_processor::QueryProcessor;
use super::strategy::SUGGEST_KEY;
use crate::cache::CacheManager;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::SearchConfig;
use crate::error::{Result, ValidationError};
use crate::fulltext::FullTextEngine;
use crate::generation::QueryExpander;
use crate::observability::{HealthChecker, HealthReport, MetricsCollector};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};

/// Popular queries kept in the cached list
const POPULAR_POOL: usize = 100;

/// Everything besides the query text that changes a search response
#[derive(Serialize)]
struct SearchScope<'a> {
    strategy: StrategyKind,
    filters: &'a SearchFilters,
    options: &'a SearchOptions,
}

pub struct SearchService {
    config: SearchConfig,
    processor: QueryProcessor,
    executor: StrategyExecutor,
    engine: Arc<dyn FullTextEngine>,
    cache: Arc<CacheManager>,
    breaker: Arc<CircuitBreaker>,
    health: HealthChecker,
    analytics: SearchAnalytics,
    metrics: Arc<MetricsCollector>,
}

impl SearchService {
    pub fn new(
        config: SearchConfig,
        executor: StrategyExecutor,
        engine: Arc<dyn FullTextEngine>,
        cache: Arc<CacheManager>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let health = HealthChecker::new(engine.clone(), cache.clone(), breaker.clone());
        let analytics = SearchAnalytics::with_capacity(config.analytics_capacity, config.analytics_idle_timeout());
        Self {
            processor: QueryProcessor::new(config.clone()),
            config,
            executor,
            engine,
            cache,
            breaker,
            health,
            analytics,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// Expand queries before retrieval
    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.processor = QueryProcessor::new(self.config.clone()).with_expander(expander);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_health_checker(mut self, health: HealthChecker) -> Self {
        self.health = health;
        self
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn analytics(&self) -> &SearchAnalytics {
        &self.analytics
    }

    /// Run a search end to end.
    ///
    /// Only validation errors are returned; every backend failure degrades
    /// the response instead. Responses assembled from fallbacks are not
    /// cached, so a recovered backend is consulted on the next call.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();

        let validated = match self.processor.validate(request) {
            Ok(validated) => validated,
            Err(e) => {
                self.metrics.record_validation_error();
                return Err(e);
            }
        };

        let query_text = validated.request.query.clone();
        let scope = SearchScope {
            strategy: validated.request.strategy.unwrap_or_default(),
            filters: &validated.request.filters,
            options: &validated.request.options,
        };

        if let Some(cached) = self.cache.get_cached_search_results(&query_text, &scope).await {
            debug!(search_id = %cached.search_id, "Serving cached response for '{}'", query_text);
            self.analytics.record_query(&query_text);
            self.metrics.record_search(started.elapsed());
            return Ok(cached);
        }

        let query = self.processor.process_validated(validated.clone()).await;
        let span = info_span!("search", search_id = %query.search_id, strategy = %query.strategy);
        let (response, degraded) = self.run(&query, started).instrument(span).await;

        if degraded {
            debug!(search_id = %query.search_id, "Not caching degraded response");
        } else {
            self.cache.cache_search_results(&query_text, &scope, &response).await;
        }

        self.analytics.record_query(&query_text);
        Ok(response)
    }

    /// Run an already processed query, bypassing the response cache
    pub async fn search_processed(&self, query: &ProcessedQuery) -> SearchResponse {
        let span = info_span!("search", search_id = %query.search_id, strategy = %query.strategy);
        let (response, _) = self.run(query, Instant::now()).instrument(span).await;
        response
    }

    async fn run(&self, query: &ProcessedQuery, started: Instant) -> (SearchResponse, bool) {
        let runs = self.executor.execute(query).await;
        let FusedResults {
            results,
            facets,
            rag_response,
            degraded,
        } = fuse(runs);

        let total_results = results.len();
        let offset = (query.options.page.max(1) - 1).saturating_mul(query.limit);
        let page: Vec<_> = results.into_iter().skip(offset).take(query.limit).collect();

        let elapsed = started.elapsed();
        self.metrics.record_search(elapsed);
        info!(
            "Search '{}' returned {} of {} results in {}ms{}",
            query.original_query,
            page.len(),
            total_results,
            elapsed.as_millis(),
            if degraded { " (degraded)" } else { "" }
        );

        let response = SearchResponse {
            results: page,
            total_results,
            search_time: elapsed.as_millis() as u64,
            search_id: query.search_id,
            facets: if query.options.include_facets { facets } else { None },
            rag_response,
        };
        (response, degraded)
    }

    /// Completion suggestions for a partial query.
    ///
    /// Lists are cached per lower-cased partial and type at the maximum
    /// size and cut to `limit` on the way out.
    pub async fn get_suggestions(
        &self,
        partial: &str,
        kind: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Suggestion>> {
        let partial = partial.trim();
        if partial.is_empty() {
            return Err(ValidationError::InvalidInput("partial query is empty".to_string()).into());
        }

        let limit = limit.unwrap_or(self.config.suggestion_limit);
        if limit == 0 || limit > self.config.max_suggestion_limit {
            return Err(ValidationError::LimitOutOfRange {
                limit,
                max: self.config.max_suggestion_limit,
            }
            .into());
        }

        if let Some(mut cached) = self.cache.get_cached_suggestions(partial, kind).await {
            cached.truncate(limit);
            return Ok(cached);
        }

        let fetched = self
            .breaker
            .execute_with_fallback(
                SUGGEST_KEY,
                || async {
                    self.engine
                        .suggest(partial, kind, self.config.max_suggestion_limit)
                        .await
                        .map(Some)
                },
                || async { None },
            )
            .await;

        let mut suggestions = match fetched {
            Ok(Some(suggestions)) => {
                self.cache.cache_suggestions(partial, kind, &suggestions).await;
                suggestions
            }
            Ok(None) => {
                self.metrics.record_fallback();
                Vec::new()
            }
            Err(e) => {
                debug!("Suggestions unavailable for '{}': {}", partial, e);
                Vec::new()
            }
        };

        suggestions.truncate(limit);
        Ok(suggestions)
    }

    /// Most frequent recent queries
    pub async fn get_popular_searches(&self, limit: usize) -> Vec<PopularSearch> {
        let mut popular = match self.cache.get_cached_popular_searches().await {
            Some(popular) => popular,
            None => {
                let popular = self.analytics.top_queries(POPULAR_POOL);
                if !popular.is_empty() {
                    self.cache.cache_popular_searches(&popular).await;
                }
                popular
            }
        };
        popular.truncate(limit);
        popular
    }

    pub async fn track_click_through(&self, event: ClickThroughEvent) -> Result<()> {
        if event.result_id.trim().is_empty() {
            return Err(ValidationError::InvalidInput("resultId is required".to_string()).into());
        }

        self.analytics.record_click(&event);
        self.metrics.record_click_through();
        Ok(())
    }

    /// Invalidate cached data matching a glob relative to the key prefix;
    /// everything when no pattern is given
    pub async fn clear_cache(&self, pattern: Option<&str>) -> usize {
        let pattern = pattern.map(str::trim).filter(|p| !p.is_empty()).unwrap_or("*");
        self.cache.delete_pattern(pattern).await
    }

    pub async fn get_health(&self) -> HealthReport {
        self.health.check_health().await
    }
}
