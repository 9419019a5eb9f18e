//! Retrieval strategies behind one uniform contract
//!
//! A hybrid query is not its own strategy: it activates both the full-text
//! and the semantic strategy and lets fusion merge them.

pub mod fulltext;
pub mod rag;
pub mod semantic;

pub use fulltext::FullTextStrategy;
pub use rag::RagStrategy;
pub use semantic::SemanticStrategy;

use super::models::{Facets, ProcessedQuery, SearchResult, StrategyKind};
use crate::error::Result;
use crate::rag::RagResponse;
use async_trait::async_trait;

/// Breaker key guarding the full-text engine
pub const ENGINE_KEY: &str = "search:engine";
/// Breaker key guarding embedding plus vector lookups
pub const VECTOR_KEY: &str = "search:vector";
/// Breaker key guarding the generation backend
pub const RAG_KEY: &str = "search:rag";
/// Breaker key guarding engine suggestions
pub const SUGGEST_KEY: &str = "search:suggest";

/// What one strategy contributed to a search
#[derive(Debug, Clone, Default)]
pub struct StrategyOutput {
    pub results: Vec<SearchResult>,
    pub facets: Option<Facets>,
    pub rag_response: Option<RagResponse>,
    /// Set when the output is a fallback rather than a real answer
    pub degraded: bool,
}

impl StrategyOutput {
    pub fn from_results(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            ..Default::default()
        }
    }

    /// Empty output served in place of a failed backend
    pub fn fallback() -> Self {
        Self {
            degraded: true,
            ..Default::default()
        }
    }
}

/// One retrieval strategy
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    /// Which backend family this strategy covers
    fn kind(&self) -> StrategyKind;

    /// Fusion tie-break; higher wins
    fn priority(&self) -> i32;

    /// Whether this strategy runs for the query
    fn can_handle(&self, query: &ProcessedQuery) -> bool;

    /// Full result set or an error, never a partial set
    async fn search(&self, query: &ProcessedQuery) -> Result<StrategyOutput>;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }
}
