//! Query processing, retrieval strategies, fusion and the search orchestrator

pub mod analytics;
pub mod executor;
pub mod fusion;
pub mod models;
pub mod query_processor;
pub mod service;
pub mod strategy;
pub mod text;

pub use analytics::SearchAnalytics;
pub use executor::{StrategyExecutor, StrategyRun};
pub use fusion::{fuse, FusedResults};
pub use models::{
    ClickThroughEvent, ContentType, PopularSearch, ProcessedQuery, SearchFilters, SearchOptions,
    SearchRequest, SearchResponse, SearchResult, StrategyKind, Suggestion,
};
pub use query_processor::QueryProcessor;
pub use service::SearchService;
pub use strategy::{FullTextStrategy, RagStrategy, SearchStrategy, SemanticStrategy, StrategyOutput};
