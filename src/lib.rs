//! Retrieval Core - full-text, semantic and RAG search for content discovery
//!
//! This library runs a query through several retrieval strategies at once,
//! fuses their results into one ranked list and shields every backend behind
//! a per-key circuit breaker and a two-tier cache.
//!
//! ## Features
//!
//! - **Hybrid Retrieval**: Keyword and vector search fused with deduplication
//! - **RAG Answers**: Token-budgeted context assembly and generated answers
//! - **Circuit Breaker Protection**: Backend failures degrade, never fail, a search
//! - **Two-Tier Cache**: In-process cache in front of a shared store
//! - **Observability**: Structured logging, metrics and health reports
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use retrieval_core::prelude::*;
//! use retrieval_core::cache::InMemoryDistributedCache;
//! use retrieval_core::fulltext::ElasticsearchEngine;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::from_file("config.toml")?;
//!
//!     let engine: Arc<dyn FullTextEngine> = Arc::new(ElasticsearchEngine::new(config.engine.clone())?);
//!     let breaker = Arc::new(CircuitBreaker::new((&config.circuit_breaker).into()));
//!     let cache = Arc::new(CacheManager::new(
//!         config.cache.clone(),
//!         Arc::new(InMemoryDistributedCache::new()),
//!     ));
//!
//!     let strategies: Vec<Arc<dyn SearchStrategy>> =
//!         vec![Arc::new(FullTextStrategy::new(engine.clone(), breaker.clone()))];
//!     let executor = StrategyExecutor::new(strategies, config.search.strategy_timeout());
//!
//!     let service = SearchService::new(config.search.clone(), executor, engine, cache, breaker);
//!     let response = service.search(SearchRequest::new("ownership and borrowing")).await?;
//!     println!("{} results", response.total_results);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod fulltext;
pub mod generation;
pub mod observability;
pub mod rag;
pub mod search;
pub mod vector_db;

pub use config::Config;
pub use error::{Result, SearchError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{CacheManager, DistributedCache};
    pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use crate::config::Config;
    pub use crate::embedding::{EmbeddingClient, EmbeddingProvider};
    pub use crate::error::{Result, SearchError, ValidationError};
    pub use crate::fulltext::FullTextEngine;
    pub use crate::generation::{GenerationClient, GenerationProvider};
    pub use crate::observability::{HealthChecker, MetricsCollector};
    pub use crate::search::{
        FullTextStrategy, RagStrategy, SearchRequest, SearchResponse, SearchService, SearchStrategy,
        SemanticStrategy, StrategyExecutor,
    };
    pub use crate::vector_db::{VectorSearchService, VectorStore};
}
