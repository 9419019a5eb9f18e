//! Component health checks with a short-lived cached report

use crate::cache::CacheManager;
use crate::circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
use crate::fulltext::FullTextEngine;
use crate::vector_db::VectorSearchService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Per-check timeout
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Health status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Component health
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub response_time_ms: Option<u64>,
}

/// Health of the retrieval core
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,

    /// Full-text engine reachable and not red
    pub engine: bool,

    /// Distributed cache tier answers
    pub cache: bool,

    /// Vector store answers, when one is attached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_store: Option<bool>,

    /// Worst state across all breaker keys
    pub circuit_breaker: CircuitState,

    pub circuits: Vec<CircuitSnapshot>,
    pub components: Vec<ComponentHealth>,
    pub uptime_secs: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
struct CachedHealth {
    report: HealthReport,
    cached_at: Instant,
}

/// Health checker with caching
pub struct HealthChecker {
    start_time: Instant,
    engine: Arc<dyn FullTextEngine>,
    cache: Arc<CacheManager>,
    breaker: Arc<CircuitBreaker>,
    vectors: Option<Arc<VectorSearchService>>,
    cached_report: RwLock<Option<CachedHealth>>,
    cache_ttl: Duration,
}

impl HealthChecker {
    /// Create a checker with a 10-second report cache
    pub fn new(engine: Arc<dyn FullTextEngine>, cache: Arc<CacheManager>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            start_time: Instant::now(),
            engine,
            cache,
            breaker,
            vectors: None,
            cached_report: RwLock::new(None),
            cache_ttl: Duration::from_secs(10),
        }
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    /// Include the vector store in the report
    pub fn with_vector_search(mut self, vectors: Arc<VectorSearchService>) -> Self {
        self.vectors = Some(vectors);
        self
    }

    /// Cached report, refreshed once older than the cache TTL
    pub async fn check_health(&self) -> HealthReport {
        {
            let cached = self.cached_report.read().await;
            if let Some(cached) = &*cached {
                if cached.cached_at.elapsed() < self.cache_ttl {
                    debug!("Returning cached health report");
                    return cached.report.clone();
                }
            }
        }

        self.check_health_fresh().await
    }

    /// Run every check now and refresh the cache
    pub async fn check_health_fresh(&self) -> HealthReport {
        let report = self.perform_health_check().await;
        *self.cached_report.write().await = Some(CachedHealth {
            report: report.clone(),
            cached_at: Instant::now(),
        });
        report
    }

    async fn perform_health_check(&self) -> HealthReport {
        let engine = self.check_engine().await;
        let cache = self.check_cache().await;
        let vectors = match &self.vectors {
            Some(vectors) => Some(self.check_vectors(vectors).await),
            None => None,
        };
        let breaker = self.check_circuit_breaker();

        let mut components = vec![engine, cache];
        components.extend(vectors);
        components.push(breaker);

        let healthy = |name: &str| {
            components
                .iter()
                .any(|c| c.name == name && c.status == HealthStatus::Healthy)
        };
        let engine_ok = healthy("search_engine");
        let cache_ok = healthy("cache");
        let vector_ok = self.vectors.as_ref().map(|_| healthy("vector_store"));

        let status = if components.iter().all(|c| c.status == HealthStatus::Healthy) {
            HealthStatus::Healthy
        } else if !engine_ok && vector_ok != Some(true) {
            // nothing left to answer queries
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        };

        HealthReport {
            status,
            engine: engine_ok,
            cache: cache_ok,
            vector_store: vector_ok,
            circuit_breaker: self.breaker.overall_state(),
            circuits: self.breaker.snapshot_all(),
            components,
            uptime_secs: self.start_time.elapsed().as_secs(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    async fn check_engine(&self) -> ComponentHealth {
        let start = Instant::now();
        let (status, message) = match tokio::time::timeout(CHECK_TIMEOUT, self.engine.health()).await {
            Ok(Ok(health)) if health.is_healthy() => (
                HealthStatus::Healthy,
                format!("Cluster {} ({} nodes)", health.status, health.number_of_nodes),
            ),
            Ok(Ok(health)) => (HealthStatus::Unhealthy, format!("Cluster {}", health.status)),
            Ok(Err(e)) => (HealthStatus::Unhealthy, format!("Engine error: {}", e)),
            Err(_) => (HealthStatus::Unhealthy, "Health check timeout".to_string()),
        };
        component("search_engine", status, message, start)
    }

    async fn check_cache(&self) -> ComponentHealth {
        let start = Instant::now();
        let (status, message) = match tokio::time::timeout(CHECK_TIMEOUT, self.cache.is_healthy()).await {
            Ok(true) => (
                HealthStatus::Healthy,
                format!("Cache operational ({} local entries)", self.cache.local_entry_count().await),
            ),
            Ok(false) => (
                HealthStatus::Degraded,
                "Distributed tier unreachable, serving from backends".to_string(),
            ),
            Err(_) => (HealthStatus::Degraded, "Health check timeout".to_string()),
        };
        component("cache", status, message, start)
    }

    async fn check_vectors(&self, vectors: &VectorSearchService) -> ComponentHealth {
        let start = Instant::now();
        let (status, message) = match tokio::time::timeout(CHECK_TIMEOUT, vectors.health()).await {
            Ok(true) => (HealthStatus::Healthy, "Vector store operational".to_string()),
            Ok(false) => (HealthStatus::Unhealthy, "Vector store unreachable".to_string()),
            Err(_) => (HealthStatus::Unhealthy, "Health check timeout".to_string()),
        };
        component("vector_store", status, message, start)
    }

    fn check_circuit_breaker(&self) -> ComponentHealth {
        let (status, message) = match self.breaker.overall_state() {
            CircuitState::Closed => (HealthStatus::Healthy, "All circuits closed"),
            CircuitState::HalfOpen => (HealthStatus::Degraded, "Circuit half-open, testing recovery"),
            CircuitState::Open => (HealthStatus::Degraded, "Circuit open, serving fallbacks"),
        };
        ComponentHealth {
            name: "circuit_breaker".to_string(),
            status,
            message: Some(message.to_string()),
            response_time_ms: Some(0),
        }
    }

    /// Simple liveness check
    pub fn liveness(&self) -> bool {
        true
    }

    /// Ready unless no backend can answer
    pub async fn readiness(&self) -> bool {
        self.check_health().await.status != HealthStatus::Unhealthy
    }
}

fn component(name: &str, status: HealthStatus, message: String, start: Instant) -> ComponentHealth {
    ComponentHealth {
        name: name.to_string(),
        status,
        message: Some(message),
        response_time_ms: Some(start.elapsed().as_millis() as u64),
    }
}
