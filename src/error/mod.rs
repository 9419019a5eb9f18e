//! Error types for the retrieval core

use thiserror::Error;

/// Result type alias for retrieval operations
pub type Result<T> = std::result::Result<T, SearchError>;

/// Main error type for the retrieval core
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Search engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Vector search error: {0}")]
    VectorSearch(#[from] VectorSearchError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("RAG error: {0}")]
    Rag(#[from] RagError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Circuit breaker open for '{key}'")]
    CircuitOpen { key: String },

    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// Whether the failure is worth counting against a backend's circuit breaker.
    ///
    /// Bad input and missing indices are answers, not outages.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::Engine(e) => e.is_transient(),
            SearchError::VectorSearch(_) => true,
            SearchError::Embedding(e) => !matches!(e, EmbeddingError::InvalidInput(_)),
            SearchError::Rag(e) => !matches!(e, RagError::NoContexts),
            SearchError::Timeout { .. } => true,
            SearchError::Validation(_)
            | SearchError::Cache(_)
            | SearchError::CircuitOpen { .. }
            | SearchError::Config(_)
            | SearchError::Internal(_) => false,
        }
    }

    /// Whether this error must reach the caller as a hard failure
    pub fn is_validation(&self) -> bool {
        matches!(self, SearchError::Validation(_))
    }
}

/// Invalid caller input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Query too short: {length} characters (min: {min})")]
    QueryTooShort { length: usize, min: usize },

    #[error("Query too long: {length} characters (max: {max})")]
    QueryTooLong { length: usize, max: usize },

    #[error("Limit {limit} out of range (1..={max})")]
    LimitOutOfRange { limit: usize, max: usize },

    #[error("Page must be at least 1")]
    InvalidPage,

    #[error("Page {page} of size {limit} is past the result window ({max_window})")]
    PageOutOfRange { page: usize, limit: usize, max_window: usize },

    #[error("Invalid date range: from is after to")]
    InvalidDateRange,

    #[error("Minimum score {0} outside [0, 1]")]
    InvalidMinScore(f32),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Errors raised by the full-text engine adapter
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Engine unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Engine request timed out")]
    Timeout,

    #[error("Engine rejected request (status {status}): {message}")]
    BadRequest { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed engine response: {0}")]
    MalformedResponse(String),
}

impl EngineError {
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Unavailable { .. } | EngineError::Timeout => true,
            EngineError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            EngineError::IndexNotFound(_)
            | EngineError::BadRequest { .. }
            | EngineError::MalformedResponse(_) => false,
        }
    }

    /// Map an HTTP status from the engine into the matching error family
    pub fn from_status(status: u16, index: &str, body: String) -> Self {
        match status {
            404 => EngineError::IndexNotFound(index.to_string()),
            408 | 504 => EngineError::Timeout,
            s if s >= 500 => EngineError::Unavailable { status: s, message: body },
            s => EngineError::BadRequest { status: s, message: body },
        }
    }
}

/// Vector store failure, carrying the request parameters for diagnostics
#[derive(Error, Debug)]
#[error("{operation} failed (limit: {limit:?}, threshold: {threshold:?}, content: {content_id:?}): {message}")]
pub struct VectorSearchError {
    pub operation: &'static str,
    pub limit: Option<usize>,
    pub threshold: Option<f32>,
    pub content_id: Option<String>,
    pub message: String,
}

impl VectorSearchError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            limit: None,
            threshold: None,
            content_id: None,
            message: message.into(),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_content(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }
}

/// Errors related to embedding generation
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Authentication failed")]
    AuthenticationFailed,
}

/// Errors raised while producing an AI answer
#[derive(Error, Debug)]
pub enum RagError {
    #[error("No relevant contexts above the similarity threshold")]
    NoContexts,

    #[error("Generation request failed: {0}")]
    Generation(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed generation response: {0}")]
    MalformedResponse(String),
}

/// Cache layer failures. Always swallowed by callers.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid key pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl From<config::ConfigError> for SearchError {
    fn from(err: config::ConfigError) -> Self {
        SearchError::Config(err.to_string())
    }
}
