//! Configuration management for the retrieval core

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use secrecy::{Secret, ExposeSecret};

pub mod loader;
pub mod validation;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    pub engine: EngineConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub vector_db: VectorDbConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Query processing and orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Minimum query length after trimming
    #[serde(default = "default_min_query_length")]
    pub min_query_length: usize,

    /// Maximum query length after trimming
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,

    /// Page size used when the caller gives none
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Hard upper bound on page size
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Deepest result reachable through paging (`page * limit`)
    #[serde(default = "default_max_result_window")]
    pub max_result_window: usize,

    /// Per-strategy timeout in milliseconds
    #[serde(default = "default_strategy_timeout_ms")]
    pub strategy_timeout_ms: u64,

    /// Expand queries through the generation service
    #[serde(default = "default_query_expansion")]
    pub query_expansion: bool,

    /// Default number of suggestions
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,

    /// Upper bound on suggestions per request
    #[serde(default = "default_max_suggestion_limit")]
    pub max_suggestion_limit: usize,

    /// Distinct queries and clicked results kept by the in-process counters
    #[serde(default = "default_analytics_capacity")]
    pub analytics_capacity: u64,

    /// Counters untouched for this long are dropped
    #[serde(default = "default_analytics_idle_secs")]
    pub analytics_idle_secs: u64,
}

/// Full-text engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine base URL
    pub url: String,

    /// Content index name
    #[serde(default = "default_index")]
    pub index: String,

    /// Alias the service reads through (optional)
    pub alias: Option<String>,

    /// Optional API key sent as `Authorization: ApiKey ...`
    #[serde(default, serialize_with = "serialize_optional_secret", deserialize_with = "deserialize_optional_secret")]
    pub api_key: Option<Secret<String>>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Field boosts applied to the multi-match query
    #[serde(default)]
    pub field_boosts: FieldBoosts,

    /// Highlight fragment size in characters
    #[serde(default = "default_fragment_size")]
    pub highlight_fragment_size: usize,

    /// Highlight fragments per field
    #[serde(default = "default_fragment_count")]
    pub highlight_fragments: usize,
}

/// Relative weights of the searchable fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldBoosts {
    #[serde(default = "default_title_boost")]
    pub title: f32,
    #[serde(default = "default_description_boost")]
    pub description: f32,
    #[serde(default = "default_content_boost")]
    pub content: f32,
    #[serde(default = "default_tags_boost")]
    pub tags: f32,
}

impl Default for FieldBoosts {
    fn default() -> Self {
        Self {
            title: default_title_boost(),
            description: default_description_boost(),
            content: default_content_boost(),
            tags: default_tags_boost(),
        }
    }
}

/// Configuration for the embedding service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding endpoint URL
    pub api_url: String,

    /// API authentication token (secured)
    #[serde(serialize_with = "serialize_secret", deserialize_with = "deserialize_secret")]
    pub api_token: Secret<String>,

    /// Model name sent with each request
    pub model: Option<String>,

    /// Expected embedding dimension
    #[serde(default = "default_vector_size")]
    pub dimension: usize,

    /// Maximum batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts per request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Enable caching
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    /// Cache TTL in seconds
    #[serde(default = "default_embedding_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Cache maximum size
    #[serde(default = "default_embedding_cache_size")]
    pub cache_size: usize,
}

/// Configuration for the answer generation service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Base URL; `/generate` and `/expand` are appended
    pub api_url: String,

    /// API authentication token (secured)
    #[serde(serialize_with = "serialize_secret", deserialize_with = "deserialize_secret")]
    pub api_token: Secret<String>,

    /// Model identifier requested from the service
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum answer tokens
    #[serde(default = "default_max_answer_tokens")]
    pub max_answer_tokens: usize,

    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

/// Configuration for the vector store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDbConfig {
    /// Qdrant server URL
    pub url: String,

    /// API key (optional, secured)
    #[serde(default, serialize_with = "serialize_optional_secret", deserialize_with = "deserialize_optional_secret")]
    pub api_key: Option<Secret<String>>,

    /// Collection holding content embeddings
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Vector dimension
    #[serde(default = "default_vector_size")]
    pub vector_size: usize,

    /// Upper bound on rows returned by one similarity query
    #[serde(default = "default_max_vector_results")]
    pub max_results: usize,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Retrieval-augmented generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Maximum contexts handed to the generator
    #[serde(default = "default_max_contexts")]
    pub max_contexts: usize,

    /// Token budget across all contexts
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Minimum cosine similarity for vector matches
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Answers below this confidence are flagged
    #[serde(default = "default_low_confidence")]
    pub low_confidence_threshold: f32,

    /// Characters per estimated token
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: f32,

    /// Cited sources surfaced as secondary results
    #[serde(default = "default_max_source_results")]
    pub max_source_results: usize,
}

/// Cache layer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Tier-1 (in-process) entry capacity
    #[serde(default = "default_local_capacity")]
    pub local_capacity: u64,

    /// Tier-1 TTL in seconds, independent of tier-2 TTLs
    #[serde(default = "default_local_ttl")]
    pub local_ttl_secs: u64,

    /// Key prefix for every entry
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// TTL for fused search responses
    #[serde(default = "default_search_ttl")]
    pub search_ttl_secs: u64,

    /// TTL for suggestion lists
    #[serde(default = "default_suggestion_ttl")]
    pub suggestion_ttl_secs: u64,

    /// TTL for the popular-searches list
    #[serde(default = "default_popular_ttl")]
    pub popular_ttl_secs: u64,
}

/// Circuit breaker settings shared by every operation key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open a circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,

    /// Cool-down before a trial call, in milliseconds
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,

    /// Timeout for each guarded call, in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server port
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Server host
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size")]
    pub max_body_size_mb: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_query_length: default_min_query_length(),
            max_query_length: default_max_query_length(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            max_result_window: default_max_result_window(),
            strategy_timeout_ms: default_strategy_timeout_ms(),
            query_expansion: default_query_expansion(),
            suggestion_limit: default_suggestion_limit(),
            max_suggestion_limit: default_max_suggestion_limit(),
            analytics_capacity: default_analytics_capacity(),
            analytics_idle_secs: default_analytics_idle_secs(),
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            max_contexts: default_max_contexts(),
            max_context_tokens: default_max_context_tokens(),
            similarity_threshold: default_similarity_threshold(),
            low_confidence_threshold: default_low_confidence(),
            chars_per_token: default_chars_per_token(),
            max_source_results: default_max_source_results(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_capacity: default_local_capacity(),
            local_ttl_secs: default_local_ttl(),
            key_prefix: default_key_prefix(),
            search_ttl_secs: default_search_ttl(),
            suggestion_ttl_secs: default_suggestion_ttl(),
            popular_ttl_secs: default_popular_ttl(),
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            host: default_server_host(),
            max_body_size_mb: default_max_body_size(),
        }
    }
}

impl SearchConfig {
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }

    pub fn analytics_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.analytics_idle_secs)
    }
}

impl CircuitBreakerSettings {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl EngineConfig {
    /// Index or alias the read path targets
    pub fn read_target(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.index)
    }

    /// Boosted field list in multi-match syntax, highest weight first
    pub fn boosted_fields(&self) -> Vec<String> {
        let boosts: HashMap<&str, f32> = [
            ("title", self.field_boosts.title),
            ("description", self.field_boosts.description),
            ("content", self.field_boosts.content),
            ("tags", self.field_boosts.tags),
        ]
        .into_iter()
        .collect();

        let mut fields: Vec<(&str, f32)> = boosts.into_iter().collect();
        fields.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        fields
            .into_iter()
            .map(|(name, boost)| format!("{}^{}", name, boost))
            .collect()
    }
}

// Default value functions
fn default_min_query_length() -> usize { 2 }
fn default_max_query_length() -> usize { 500 }
fn default_limit() -> usize { 20 }
fn default_max_limit() -> usize { 100 }
fn default_max_result_window() -> usize { 10_000 }
fn default_strategy_timeout_ms() -> u64 { 10_000 }
fn default_query_expansion() -> bool { true }
fn default_suggestion_limit() -> usize { 10 }
fn default_max_suggestion_limit() -> usize { 50 }
fn default_analytics_capacity() -> u64 { 10_000 }
fn default_analytics_idle_secs() -> u64 { 86_400 }

fn default_index() -> String { "content".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_fragment_size() -> usize { 150 }
fn default_fragment_count() -> usize { 3 }
fn default_title_boost() -> f32 { 3.0 }
fn default_description_boost() -> f32 { 2.0 }
fn default_content_boost() -> f32 { 1.0 }
fn default_tags_boost() -> f32 { 0.5 }

fn default_batch_size() -> usize { 32 }
fn default_max_retries() -> u32 { 3 }
fn default_cache_enabled() -> bool { true }
fn default_embedding_cache_ttl() -> u64 { 3600 }
fn default_embedding_cache_size() -> usize { 1000 }

fn default_model() -> String { "default".to_string() }
fn default_temperature() -> f32 { 0.2 }
fn default_max_answer_tokens() -> usize { 1024 }
fn default_generation_timeout() -> u64 { 60 }

fn default_collection() -> String { "content_embeddings".to_string() }
fn default_vector_size() -> usize { 1024 }
fn default_max_vector_results() -> usize { 100 }

fn default_max_contexts() -> usize { 5 }
fn default_max_context_tokens() -> usize { 4000 }
fn default_similarity_threshold() -> f32 { 0.7 }
fn default_low_confidence() -> f32 { 0.3 }
fn default_chars_per_token() -> f32 { 4.0 }
fn default_max_source_results() -> usize { 5 }

fn default_local_capacity() -> u64 { 10_000 }
fn default_local_ttl() -> u64 { 60 }
fn default_key_prefix() -> String { "retrieval".to_string() }
fn default_search_ttl() -> u64 { 300 }
fn default_suggestion_ttl() -> u64 { 3600 }
fn default_popular_ttl() -> u64 { 1800 }

fn default_failure_threshold() -> usize { 5 }
fn default_reset_timeout_ms() -> u64 { 60_000 }
fn default_call_timeout_ms() -> u64 { 5_000 }

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }
fn default_server_port() -> u16 { 8080 }
fn default_server_host() -> String { "0.0.0.0".to_string() }
fn default_max_body_size() -> usize { 1 }

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let config = loader::load_config(path)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let config = loader::load_config_with_env(path)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Validate this configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        validation::validate_config(self)
    }

    /// Create default configuration pointing at local services
    pub fn default_config() -> Self {
        Self {
            search: SearchConfig::default(),
            engine: EngineConfig {
                url: "http://localhost:9200".to_string(),
                index: default_index(),
                alias: None,
                api_key: None,
                timeout_secs: default_timeout(),
                field_boosts: FieldBoosts::default(),
                highlight_fragment_size: default_fragment_size(),
                highlight_fragments: default_fragment_count(),
            },
            embedding: EmbeddingConfig {
                api_url: "http://localhost:8081/v1/embeddings".to_string(),
                api_token: Secret::new(std::env::var("EMBEDDING_API_TOKEN").unwrap_or_default()),
                model: None,
                dimension: default_vector_size(),
                batch_size: default_batch_size(),
                timeout_secs: default_timeout(),
                max_retries: default_max_retries(),
                cache_enabled: default_cache_enabled(),
                cache_ttl_secs: default_embedding_cache_ttl(),
                cache_size: default_embedding_cache_size(),
            },
            generation: GenerationConfig {
                api_url: "http://localhost:8082".to_string(),
                api_token: Secret::new(std::env::var("GENERATION_API_TOKEN").unwrap_or_default()),
                model: default_model(),
                temperature: default_temperature(),
                max_answer_tokens: default_max_answer_tokens(),
                timeout_secs: default_generation_timeout(),
            },
            vector_db: VectorDbConfig {
                url: "http://localhost:6334".to_string(),
                api_key: None,
                collection: default_collection(),
                vector_size: default_vector_size(),
                max_results: default_max_vector_results(),
                timeout_secs: default_timeout(),
            },
            rag: RagConfig::default(),
            cache: CacheConfig::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Custom serializer for Secret<String>
fn serialize_secret<S>(secret: &Secret<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

/// Custom deserializer for Secret<String>
fn deserialize_secret<'de, D>(deserializer: D) -> Result<Secret<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(Secret::new(s))
}

/// Custom serializer for Option<Secret<String>>
fn serialize_optional_secret<S>(secret: &Option<Secret<String>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// Custom deserializer for Option<Secret<String>>
fn deserialize_optional_secret<'de, D>(deserializer: D) -> Result<Option<Secret<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.map(Secret::new))
}
