//! Deterministic cache key construction

use serde::Serialize;
use sha2::{Digest, Sha256};

pub const SEARCH_NAMESPACE: &str = "search";
pub const SUGGEST_NAMESPACE: &str = "suggest";
pub const POPULAR_KEY: &str = "popular:searches";

/// Builds namespaced keys under a shared prefix
#[derive(Debug, Clone)]
pub struct CacheKeys {
    prefix: String,
}

impl CacheKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Key for a fused search response.
    ///
    /// The query is lower-cased with whitespace collapsed; `scope` is any
    /// serializable value that changes the response (filters, paging, flags).
    pub fn search<S: Serialize>(&self, query: &str, scope: &S) -> String {
        let normalized = normalize_query(query);
        let serialized = serde_json::to_string(scope).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update(b"|");
        hasher.update(serialized.as_bytes());

        format!("{}:{}:{}", self.prefix, SEARCH_NAMESPACE, hex::encode(hasher.finalize()))
    }

    /// Key for a suggestion list
    pub fn suggestions(&self, partial: &str, kind: Option<&str>) -> String {
        format!(
            "{}:{}:{}:{}",
            self.prefix,
            SUGGEST_NAMESPACE,
            kind.unwrap_or("all"),
            partial.trim().to_lowercase()
        )
    }

    /// Fixed key of the popular-searches list
    pub fn popular(&self) -> String {
        format!("{}:{}", self.prefix, POPULAR_KEY)
    }

    /// Prefix a caller-supplied glob pattern
    pub fn pattern(&self, pattern: &str) -> String {
        format!("{}:{}", self.prefix, pattern)
    }
}

/// Lower-case and collapse runs of whitespace
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_key_is_deterministic_and_normalized() {
        let keys = CacheKeys::new("retrieval");
        let scope = json!({"contentTypes": ["video"]});

        let a = keys.search("Machine   Learning", &scope);
        let b = keys.search("machine learning", &scope);

        assert_eq!(a, b);
        assert!(a.starts_with("retrieval:search:"));
    }

    #[test]
    fn test_search_key_depends_on_scope() {
        let keys = CacheKeys::new("retrieval");
        let a = keys.search("rust", &json!({"contentTypes": ["video"]}));
        let b = keys.search("rust", &json!({"contentTypes": ["article"]}));
        assert_ne!(a, b);
    }

    #[test]
    fn test_suggestion_key_lowercases() {
        let keys = CacheKeys::new("retrieval");
        assert_eq!(keys.suggestions(" Mach ", None), "retrieval:suggest:all:mach");
        assert_eq!(keys.suggestions("Mach", Some("course")), "retrieval:suggest:course:mach");
    }
}
