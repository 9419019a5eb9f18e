//! Keyword retrieval through the full-text engine

use super::{SearchStrategy, StrategyOutput, ENGINE_KEY};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::Result;
use crate::fulltext::{EngineQuery, FullTextEngine};
use crate::observability::MetricsCollector;
use crate::search::models::{ProcessedQuery, StrategyKind};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct FullTextStrategy {
    engine: Arc<dyn FullTextEngine>,
    breaker: Arc<CircuitBreaker>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl FullTextStrategy {
    pub fn new(engine: Arc<dyn FullTextEngine>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            engine,
            breaker,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl SearchStrategy for FullTextStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FullText
    }

    fn priority(&self) -> i32 {
        10
    }

    fn can_handle(&self, query: &ProcessedQuery) -> bool {
        matches!(query.strategy, StrategyKind::FullText | StrategyKind::Hybrid)
    }

    async fn search(&self, query: &ProcessedQuery) -> Result<StrategyOutput> {
        let engine_query = EngineQuery::from_processed(query);

        let output = self
            .breaker
            .execute_with_fallback(
                ENGINE_KEY,
                || async {
                    let response = self.engine.search(&engine_query).await?;
                    Ok(StrategyOutput {
                        results: response.results,
                        facets: response.facets,
                        rag_response: None,
                        degraded: false,
                    })
                },
                || async { StrategyOutput::fallback() },
            )
            .await?;

        if output.degraded {
            if let Some(metrics) = &self.metrics {
                metrics.record_fallback();
            }
        }

        debug!(
            search_id = %query.search_id,
            "Full-text strategy produced {} results",
            output.results.len()
        );
        Ok(output)
    }
}
