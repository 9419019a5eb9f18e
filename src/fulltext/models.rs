//! Engine-side document and response models

use crate::search::models::{Facets, ProcessedQuery, SearchFilters, SearchResult, SortSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Facet name exposed to callers and the index field it aggregates
pub const FACET_FIELDS: &[(&str, &str)] = &[
    ("contentType", "content_type"),
    ("tags", "tags"),
    ("categories", "categories"),
    ("courseId", "course_id"),
    ("language", "language"),
];

/// Keyword query handed to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineQuery {
    pub text: String,
    pub filters: SearchFilters,
    pub from: usize,
    pub size: usize,
    pub include_highlights: bool,
    pub include_facets: bool,
    pub sort: Option<SortSpec>,
}

impl EngineQuery {
    pub fn new(text: impl Into<String>, size: usize) -> Self {
        Self {
            text: text.into(),
            filters: SearchFilters::default(),
            from: 0,
            size,
            include_highlights: true,
            include_facets: false,
            sort: None,
        }
    }

    /// Top candidates for every page up to the requested one; the
    /// orchestrator pages the fused list
    pub fn from_processed(query: &ProcessedQuery) -> Self {
        Self {
            text: query.expanded_query.clone(),
            filters: query.filters.clone(),
            from: 0,
            size: query.candidate_window(),
            include_highlights: query.options.include_highlights,
            include_facets: query.options.include_facets,
            sort: query.options.sort,
        }
    }
}

/// Mapped engine response
#[derive(Debug, Clone, Default)]
pub struct EngineResponse {
    pub results: Vec<SearchResult>,
    pub total: u64,
    pub facets: Option<Facets>,
    pub took_ms: u64,
}

/// Document as stored in the content index
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexedDocument {
    pub id: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_content_type() -> String {
    "document".to_string()
}

/// Outcome of a bulk request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub indexed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Index summary from the engine's cat API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexStatus {
    pub index: String,
    pub health: String,
    pub status: String,
    pub docs_count: u64,
    pub store_size: Option<String>,
}

/// Cluster health summary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineHealth {
    pub status: String,
    pub number_of_nodes: u64,
}

impl EngineHealth {
    /// Red clusters cannot serve every shard
    pub fn is_healthy(&self) -> bool {
        self.status != "red"
    }
}

/// Index definition for the content index: keyword facets, analyzed text
/// fields and a completion field with a content-type context
pub fn content_index_definition() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "analysis": {
                "analyzer": {
                    "content_text": {
                        "type": "custom",
                        "tokenizer": "standard",
                        "filter": ["lowercase", "asciifolding", "porter_stem"]
                    }
                }
            }
        },
        "mappings": {
            "properties": {
                "id": {"type": "keyword"},
                "content_type": {"type": "keyword"},
                "title": {
                    "type": "text",
                    "analyzer": "content_text",
                    "fields": {"keyword": {"type": "keyword", "ignore_above": 256}}
                },
                "description": {"type": "text", "analyzer": "content_text"},
                "content": {"type": "text", "analyzer": "content_text"},
                "tags": {"type": "keyword"},
                "categories": {"type": "keyword"},
                "course_id": {"type": "keyword"},
                "module_id": {"type": "keyword"},
                "chunk_id": {"type": "keyword"},
                "language": {"type": "keyword"},
                "url": {"type": "keyword", "index": false},
                "created_at": {"type": "date"},
                "updated_at": {"type": "date"},
                "suggest": {
                    "type": "completion",
                    "contexts": [{"name": "content_type", "type": "category", "path": "content_type"}]
                }
            }
        }
    })
}
