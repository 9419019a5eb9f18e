//! Configuration loader with environment variable support

use super::Config;
use crate::error::Result;
use config::{Environment, File};
use std::path::Path;

/// Prefix for environment overrides, e.g. `RETRIEVAL__ENGINE__URL`
pub const ENV_PREFIX: &str = "RETRIEVAL";

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = config::Config::builder()
        .add_source(File::from(path.as_ref()))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    Ok(cfg)
}

/// Load configuration from a TOML file with environment variable overrides
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = config::Config::builder()
        .add_source(File::from(path.as_ref()))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
        )
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("retrieval-config-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let path = write_config(
            r#"
[engine]
url = "http://localhost:9200"

[embedding]
api_url = "http://localhost:8081/v1/embeddings"
api_token = "emb-token"

[generation]
api_url = "http://localhost:8082"
api_token = "gen-token"

[vector_db]
url = "http://localhost:6334"
"#,
        );

        let config = load_config(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.engine.index, "content");
        assert_eq!(config.search.min_query_length, 2);
        assert_eq!(config.rag.similarity_threshold, 0.7);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.cache.search_ttl_secs, 300);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = load_config("/nonexistent/retrieval.toml");
        assert!(matches!(result, Err(crate::error::SearchError::Config(_))));
    }
}
