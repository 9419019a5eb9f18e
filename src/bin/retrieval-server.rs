//! Retrieval Server Binary
//!
//! Main entry point for running the retrieval core as a standalone HTTP
//! service. Wires every backend client, strategy and cache tier from the
//! configuration file and serves the search API with Axum.

use anyhow::Context;
use retrieval_core::{
    api::{build_router, AppState},
    cache::{CacheManager, InMemoryDistributedCache},
    circuit_breaker::CircuitBreaker,
    config::Config,
    embedding::{EmbeddingClient, EmbeddingProvider},
    fulltext::{ElasticsearchEngine, FullTextEngine},
    generation::{GenerationClient, GenerationOptions},
    observability::{init_observability, HealthChecker, MetricsCollector},
    rag::TokenEstimator,
    search::{FullTextStrategy, RagStrategy, SearchService, SearchStrategy, SemanticStrategy, StrategyExecutor},
    vector_db::{QdrantVectorStore, VectorSearchService},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::from_file_with_env(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    init_observability(&config.logging.level, &config.logging.format);
    info!("Starting Retrieval Server");
    info!("Configuration loaded and validated from {}", config_path);

    let metrics = Arc::new(MetricsCollector::new());
    let breaker = Arc::new(CircuitBreaker::new((&config.circuit_breaker).into()));

    // The shared tier is process-local until a networked store is configured
    let cache = Arc::new(
        CacheManager::new(config.cache.clone(), Arc::new(InMemoryDistributedCache::new()))
            .with_metrics(metrics.clone()),
    );

    let engine: Arc<dyn FullTextEngine> = Arc::new(ElasticsearchEngine::new(config.engine.clone())?);
    info!("Full-text engine adapter initialized");

    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(EmbeddingClient::new(config.embedding.clone())?);
    info!("Embedding client initialized");

    let generation = Arc::new(GenerationClient::new(config.generation.clone())?);
    info!("Generation client initialized");

    let store = QdrantVectorStore::new(config.vector_db.clone())?;
    if let Err(e) = store.ensure_collection().await {
        // Semantic and RAG strategies degrade until the store is reachable
        warn!("Could not ensure vector collection: {}", e);
    }
    let vectors = Arc::new(
        VectorSearchService::new(Arc::new(store), config.vector_db.max_results)
            .with_token_estimator(TokenEstimator::new(config.rag.chars_per_token)),
    );
    info!("Vector search service initialized");

    let strategies: Vec<Arc<dyn SearchStrategy>> = vec![
        Arc::new(FullTextStrategy::new(engine.clone(), breaker.clone()).with_metrics(metrics.clone())),
        Arc::new(
            SemanticStrategy::new(
                embedder.clone(),
                vectors.clone(),
                breaker.clone(),
                config.rag.similarity_threshold,
            )
            .with_metrics(metrics.clone()),
        ),
        Arc::new(
            RagStrategy::new(
                embedder,
                vectors.clone(),
                generation.clone(),
                breaker.clone(),
                config.rag.clone(),
                GenerationOptions::from(&config.generation),
            )
            .with_metrics(metrics.clone()),
        ),
    ];
    let executor = StrategyExecutor::new(strategies, config.search.strategy_timeout())
        .with_metrics(metrics.clone());

    let health = HealthChecker::new(engine.clone(), cache.clone(), breaker.clone()).with_vector_search(vectors);

    let service = SearchService::new(config.search.clone(), executor, engine, cache, breaker)
        .with_expander(generation)
        .with_metrics(metrics)
        .with_health_checker(health);
    info!("Search service initialized");

    let app = build_router(
        AppState::new(Arc::new(service)),
        config.server.max_body_size_mb * 1024 * 1024,
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}
