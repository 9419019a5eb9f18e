//! Configuration validation

use super::*;
use crate::error::{SearchError, Result};

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_search_config(&config.search)?;
    validate_engine_config(&config.engine)?;
    validate_embedding_config(&config.embedding)?;
    validate_generation_config(&config.generation)?;
    validate_vector_db_config(&config.vector_db)?;
    validate_rag_config(&config.rag)?;
    validate_cache_config(&config.cache)?;
    validate_circuit_breaker_config(&config.circuit_breaker)?;
    validate_server_config(&config.server)?;
    Ok(())
}

/// Cited RAG sources surfaced next to an answer
const MAX_CITED_SOURCES: usize = 5;

fn config_error(message: impl Into<String>) -> SearchError {
    SearchError::Config(message.into())
}

fn validate_url(name: &str, url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(config_error(format!("{} URL cannot be empty", name)));
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(config_error(format!("{} URL must start with http:// or https://", name)));
    }

    Ok(())
}

fn validate_unit_interval(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(config_error(format!("{} must be between 0.0 and 1.0", name)));
    }
    Ok(())
}

/// Validate query processing settings
fn validate_search_config(config: &SearchConfig) -> Result<()> {
    if config.min_query_length == 0 {
        return Err(config_error("Minimum query length must be greater than 0"));
    }

    if config.max_query_length < config.min_query_length {
        return Err(config_error("Maximum query length must not be below the minimum"));
    }

    if config.max_limit == 0 || config.default_limit == 0 {
        return Err(config_error("Result limits must be greater than 0"));
    }

    if config.default_limit > config.max_limit {
        return Err(config_error(format!(
            "Default limit {} exceeds max limit {}",
            config.default_limit, config.max_limit
        )));
    }

    if config.max_result_window < config.max_limit {
        return Err(config_error(format!(
            "Max result window {} is below max limit {}",
            config.max_result_window, config.max_limit
        )));
    }

    if config.strategy_timeout_ms == 0 {
        return Err(config_error("Strategy timeout must be greater than 0"));
    }

    if config.suggestion_limit == 0 || config.suggestion_limit > config.max_suggestion_limit {
        return Err(config_error("Suggestion limit must be in 1..=max_suggestion_limit"));
    }

    if config.analytics_capacity == 0 || config.analytics_idle_secs == 0 {
        return Err(config_error("Analytics capacity and idle timeout must be greater than 0"));
    }

    Ok(())
}

/// Validate full-text engine settings
fn validate_engine_config(config: &EngineConfig) -> Result<()> {
    validate_url("Engine", &config.url)?;

    if config.index.is_empty() {
        return Err(config_error("Engine index name cannot be empty"));
    }

    if config.timeout_secs == 0 || config.timeout_secs > 300 {
        return Err(config_error("Engine timeout must be in 1..=300 seconds"));
    }

    let boosts = &config.field_boosts;
    if [boosts.title, boosts.description, boosts.content, boosts.tags]
        .iter()
        .any(|b| *b <= 0.0)
    {
        return Err(config_error("Field boosts must be positive"));
    }

    if config.highlight_fragment_size == 0 {
        return Err(config_error("Highlight fragment size must be greater than 0"));
    }

    Ok(())
}

/// Validate embedding configuration
fn validate_embedding_config(config: &EmbeddingConfig) -> Result<()> {
    validate_url("Embedding API", &config.api_url)?;

    if config.api_token.expose_secret().is_empty() {
        return Err(config_error("Embedding API token is required"));
    }

    if config.batch_size == 0 {
        return Err(config_error("Embedding batch size must be greater than 0"));
    }

    if config.batch_size > 1000 {
        return Err(config_error("Embedding batch size too large (max: 1000)"));
    }

    if config.timeout_secs == 0 || config.timeout_secs > 300 {
        return Err(config_error("Embedding timeout must be in 1..=300 seconds"));
    }

    if config.max_retries == 0 || config.max_retries > 10 {
        return Err(config_error("Embedding max retries must be in 1..=10"));
    }

    if config.cache_enabled && (config.cache_size == 0 || config.cache_ttl_secs == 0) {
        return Err(config_error(
            "Cache size and TTL must be greater than 0 when cache is enabled",
        ));
    }

    Ok(())
}

/// Validate generation configuration
fn validate_generation_config(config: &GenerationConfig) -> Result<()> {
    validate_url("Generation API", &config.api_url)?;

    if config.api_token.expose_secret().is_empty() {
        return Err(config_error("Generation API token is required"));
    }

    if !(0.0..=2.0).contains(&config.temperature) {
        return Err(config_error("Temperature must be between 0.0 and 2.0"));
    }

    if config.timeout_secs == 0 || config.timeout_secs > 600 {
        return Err(config_error("Generation timeout must be in 1..=600 seconds"));
    }

    Ok(())
}

/// Validate vector database configuration
fn validate_vector_db_config(config: &VectorDbConfig) -> Result<()> {
    validate_url("Vector database", &config.url)?;

    if config.collection.is_empty() {
        return Err(config_error("Collection name cannot be empty"));
    }

    if config.vector_size == 0 {
        return Err(config_error("Vector size must be greater than 0"));
    }

    if config.vector_size > 4096 {
        return Err(config_error("Vector size too large (max: 4096)"));
    }

    if config.max_results == 0 {
        return Err(config_error("Max vector results must be greater than 0"));
    }

    if config.timeout_secs == 0 || config.timeout_secs > 300 {
        return Err(config_error("Database timeout must be in 1..=300 seconds"));
    }

    Ok(())
}

/// Validate RAG settings
fn validate_rag_config(config: &RagConfig) -> Result<()> {
    if config.max_contexts == 0 {
        return Err(config_error("Max contexts must be greater than 0"));
    }

    if config.max_context_tokens == 0 || config.max_context_tokens > 1_000_000 {
        return Err(config_error("Max context tokens must be in 1..=1000000"));
    }

    validate_unit_interval("Similarity threshold", config.similarity_threshold)?;
    validate_unit_interval("Low confidence threshold", config.low_confidence_threshold)?;

    if config.chars_per_token <= 0.0 {
        return Err(config_error("Characters per token must be positive"));
    }

    if config.max_source_results > MAX_CITED_SOURCES {
        return Err(config_error(format!(
            "Max source results {} exceeds {}",
            config.max_source_results, MAX_CITED_SOURCES
        )));
    }

    Ok(())
}

/// Validate cache settings
fn validate_cache_config(config: &CacheConfig) -> Result<()> {
    if config.local_capacity == 0 {
        return Err(config_error("Local cache capacity must be greater than 0"));
    }

    if config.local_ttl_secs == 0 {
        return Err(config_error("Local cache TTL must be greater than 0"));
    }

    if config.search_ttl_secs == 0 || config.suggestion_ttl_secs == 0 || config.popular_ttl_secs == 0 {
        return Err(config_error("Cache TTLs must be greater than 0"));
    }

    Ok(())
}

/// Validate circuit breaker settings
fn validate_circuit_breaker_config(config: &CircuitBreakerSettings) -> Result<()> {
    if config.failure_threshold == 0 {
        return Err(config_error("Failure threshold must be greater than 0"));
    }

    if config.reset_timeout_ms == 0 || config.call_timeout_ms == 0 {
        return Err(config_error("Circuit breaker timeouts must be greater than 0"));
    }

    Ok(())
}

/// Validate server configuration
pub fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.port == 0 {
        return Err(config_error("Server port cannot be 0"));
    }

    if config.host.is_empty() {
        return Err(config_error("Server host cannot be empty"));
    }

    if config.max_body_size_mb == 0 || config.max_body_size_mb > 100 {
        return Err(config_error("Max body size must be in 1..=100 MB"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn valid_config() -> Config {
        let mut config = Config::default_config();
        config.embedding.api_token = Secret::new("test_token".to_string());
        config.generation.api_token = Secret::new("test_token".to_string());
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_tokens_rejected() {
        let mut config = valid_config();
        config.generation.api_token = Secret::new(String::new());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_engine_url() {
        let mut config = valid_config();
        config.engine.url = "localhost:9200".to_string();
        assert!(validate_engine_config(&config.engine).is_err());
    }

    #[test]
    fn test_default_limit_above_max() {
        let mut config = valid_config();
        config.search.default_limit = 500;
        assert!(validate_search_config(&config.search).is_err());
    }

    #[test]
    fn test_invalid_similarity_threshold() {
        let mut config = valid_config();
        config.rag.similarity_threshold = 1.5;
        assert!(validate_rag_config(&config.rag).is_err());
    }

    #[test]
    fn test_cited_sources_capped_at_five() {
        let mut config = valid_config();
        config.rag.max_source_results = 5;
        assert!(validate_rag_config(&config.rag).is_ok());
        config.rag.max_source_results = 6;
        assert!(validate_rag_config(&config.rag).is_err());
    }

    #[test]
    fn test_result_window_below_max_limit() {
        let mut config = valid_config();
        config.search.max_result_window = 50;
        assert!(validate_search_config(&config.search).is_err());
    }

    #[test]
    fn test_zero_analytics_capacity() {
        let mut config = valid_config();
        config.search.analytics_capacity = 0;
        assert!(validate_search_config(&config.search).is_err());
    }

    #[test]
    fn test_zero_failure_threshold() {
        let mut config = valid_config();
        config.circuit_breaker.failure_threshold = 0;
        assert!(validate_circuit_breaker_config(&config.circuit_breaker).is_err());
    }
}
