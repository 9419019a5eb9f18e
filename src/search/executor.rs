//! Concurrent fan-out over the applicable strategies

use super::models::{ProcessedQuery, StrategyKind};
use super::strategy::{SearchStrategy, StrategyOutput};
use crate::observability::MetricsCollector;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info_span, warn, Instrument};

/// Output of one strategy together with how it ran
#[derive(Debug, Clone)]
pub struct StrategyRun {
    pub kind: StrategyKind,
    pub priority: i32,
    pub output: StrategyOutput,
    /// Failure that replaced this strategy's contribution with an empty set
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl StrategyRun {
    pub fn is_degraded(&self) -> bool {
        self.error.is_some() || self.output.degraded
    }
}

/// Runs every strategy that accepts a query, each under its own timeout
pub struct StrategyExecutor {
    strategies: Vec<Arc<dyn SearchStrategy>>,
    timeout: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl StrategyExecutor {
    pub fn new(strategies: Vec<Arc<dyn SearchStrategy>>, timeout: Duration) -> Self {
        Self {
            strategies,
            timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Strategies whose `can_handle` accepts the query
    pub fn select(&self, query: &ProcessedQuery) -> Vec<Arc<dyn SearchStrategy>> {
        self.strategies
            .iter()
            .filter(|s| s.can_handle(query))
            .cloned()
            .collect()
    }

    /// Run the selected strategies concurrently.
    ///
    /// Total time is bounded by the slowest strategy's timeout. A failing or
    /// timed-out strategy contributes an empty output and never fails the
    /// others.
    pub async fn execute(&self, query: &ProcessedQuery) -> Vec<StrategyRun> {
        let selected = self.select(query);
        debug!(
            search_id = %query.search_id,
            "Running {} strategies for '{}' query",
            selected.len(),
            query.strategy
        );

        let runs = selected.into_iter().map(|strategy| {
            let span = info_span!("strategy", search_id = %query.search_id, strategy = strategy.name());
            self.run_one(strategy, query).instrument(span)
        });

        join_all(runs).await
    }

    async fn run_one(&self, strategy: Arc<dyn SearchStrategy>, query: &ProcessedQuery) -> StrategyRun {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, strategy.search(query)).await;
        let elapsed = started.elapsed();

        let (output, error) = match outcome {
            Ok(Ok(output)) => (output, None),
            Ok(Err(e)) => {
                warn!("Strategy {} failed: {}", strategy.name(), e);
                (StrategyOutput::default(), Some(e.to_string()))
            }
            Err(_) => {
                warn!("Strategy {} timed out after {:?}", strategy.name(), self.timeout);
                (
                    StrategyOutput::default(),
                    Some(format!("timed out after {}ms", self.timeout.as_millis())),
                )
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_strategy_latency(strategy.name(), elapsed);
            if error.is_some() {
                metrics.record_strategy_failure();
            }
        }

        StrategyRun {
            kind: strategy.kind(),
            priority: strategy.priority(),
            output,
            error,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::error::{Result, SearchError};
    use crate::search::models::SearchRequest;
    use crate::search::query_processor::QueryProcessor;
    use async_trait::async_trait;

    enum Behavior {
        Succeed,
        Fail,
        Hang,
    }

    struct Scripted {
        kind: StrategyKind,
        behavior: Behavior,
    }

    #[async_trait]
    impl SearchStrategy for Scripted {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        fn priority(&self) -> i32 {
            1
        }

        fn can_handle(&self, query: &ProcessedQuery) -> bool {
            query.strategy == self.kind || query.strategy == StrategyKind::Hybrid
        }

        async fn search(&self, _query: &ProcessedQuery) -> Result<StrategyOutput> {
            match self.behavior {
                Behavior::Succeed => Ok(StrategyOutput::default()),
                Behavior::Fail => Err(SearchError::Internal("boom".to_string())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(StrategyOutput::default())
                }
            }
        }
    }

    fn executor(behaviors: Vec<(StrategyKind, Behavior)>) -> StrategyExecutor {
        let strategies = behaviors
            .into_iter()
            .map(|(kind, behavior)| Arc::new(Scripted { kind, behavior }) as Arc<dyn SearchStrategy>)
            .collect();
        StrategyExecutor::new(strategies, Duration::from_millis(100))
    }

    async fn query(strategy: StrategyKind) -> ProcessedQuery {
        QueryProcessor::new(SearchConfig::default())
            .process(SearchRequest::new("machine learning").with_strategy(strategy))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_selection_by_tag() {
        let executor = executor(vec![
            (StrategyKind::FullText, Behavior::Succeed),
            (StrategyKind::Semantic, Behavior::Succeed),
        ]);

        assert_eq!(executor.select(&query(StrategyKind::Hybrid).await).len(), 2);
        assert_eq!(executor.select(&query(StrategyKind::Semantic).await).len(), 1);
        assert!(executor.select(&query(StrategyKind::Rag).await).is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let executor = executor(vec![
            (StrategyKind::FullText, Behavior::Fail),
            (StrategyKind::Semantic, Behavior::Succeed),
        ]);
        let runs = executor.execute(&query(StrategyKind::Hybrid).await).await;

        assert_eq!(runs.len(), 2);
        assert!(runs[0].is_degraded());
        assert!(runs[0].error.as_deref().unwrap().contains("boom"));
        assert!(!runs[1].is_degraded());
    }

    #[tokio::test]
    async fn test_hung_strategy_is_bounded() {
        let metrics = Arc::new(MetricsCollector::new());
        let executor = executor(vec![
            (StrategyKind::FullText, Behavior::Hang),
            (StrategyKind::Semantic, Behavior::Succeed),
        ])
        .with_metrics(metrics.clone());

        let started = Instant::now();
        let runs = executor.execute(&query(StrategyKind::Hybrid).await).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(runs[0].error.as_deref().unwrap().contains("timed out"));
        assert_eq!(metrics.get_metrics().strategy_failures, 1);
    }
}
