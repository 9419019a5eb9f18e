//! Request, result and response types shared by every strategy

use crate::error::ValidationError;
use crate::rag::RagResponse;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Retrieval strategy requested by the caller
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    FullText,
    Semantic,
    #[default]
    Hybrid,
    Rag,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::FullText => "full-text",
            StrategyKind::Semantic => "semantic",
            StrategyKind::Hybrid => "hybrid",
            StrategyKind::Rag => "rag",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of content a result points at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Course,
    Module,
    Lesson,
    Video,
    Article,
    #[default]
    Document,
    Quiz,
    AiAnswer,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Course => "course",
            ContentType::Module => "module",
            ContentType::Lesson => "lesson",
            ContentType::Video => "video",
            ContentType::Article => "article",
            ContentType::Document => "document",
            ContentType::Quiz => "quiz",
            ContentType::AiAnswer => "ai_answer",
        }
    }

    /// Parse a stored content type, falling back to `Document` for unknown values
    pub fn parse_lenient(value: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(value.to_string())).unwrap_or_default()
    }
}

/// Inclusive creation-date window
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
}

/// Hard constraints applied by every strategy.
///
/// An empty filter set means unrestricted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_types: Vec<ContentType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub course_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub module_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self == &SearchFilters::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(range) = &self.date_range {
            if let (Some(from), Some(to)) = (range.from, range.to) {
                if from > to {
                    return Err(ValidationError::InvalidDateRange);
                }
            }
        }

        if let Some(min) = self.min_score {
            if !(0.0..=1.0).contains(&min) {
                return Err(ValidationError::InvalidMinScore(min));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Relevance,
    CreatedAt,
    UpdatedAt,
    Title,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SortSpec {
    #[serde(default)]
    pub field: SortField,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Paging and feature flags for one search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    #[serde(default = "default_page")]
    pub page: usize,

    /// Page size; the configured default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(default = "default_true")]
    pub include_highlights: bool,

    #[serde(default)]
    pub include_facets: bool,

    #[serde(default, rename = "includeRAG")]
    pub include_rag: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
}

fn default_page() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            page: 1,
            limit: None,
            include_highlights: true,
            include_facets: false,
            include_rag: false,
            sort: None,
        }
    }
}

/// Caller context carried alongside the query for analytics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

/// Raw search request as received from a caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyKind>,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub options: SearchOptions,
    #[serde(default)]
    pub context: SearchContext,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }
}

/// A validated, normalized query. Built once per request and shared
/// read-only by every strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedQuery {
    pub original_query: String,
    pub expanded_query: String,
    pub tokens: Vec<String>,
    pub strategy: StrategyKind,
    pub filters: SearchFilters,
    pub options: SearchOptions,
    pub context: SearchContext,
    pub search_id: Uuid,
    /// Effective page size after defaults were applied
    pub limit: usize,
}

impl ProcessedQuery {
    /// Number of top-ranked candidates needed to serve the requested page
    pub fn candidate_window(&self) -> usize {
        self.options.page.max(1).saturating_mul(self.limit)
    }
}

/// Which backend produced a result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    FullText,
    Vector,
    Rag,
}

/// Provenance of a result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultSource {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ResultSource {
    pub fn new(kind: SourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            url: None,
            metadata: HashMap::new(),
        }
    }

    pub fn chunk_id(&self) -> Option<String> {
        match self.metadata.get("chunkId") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    }
}

/// One ranked hit in the common result shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
    pub score: f32,
    pub relevance_score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_score: Option<f32>,
    pub source: ResultSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SearchResult {
    /// Identity used to merge the same hit reported by several strategies
    pub fn dedup_key(&self) -> (String, Option<String>) {
        (self.source.id.clone(), self.source.chunk_id())
    }

    /// Length of the body text used as a ranking tie-breaker
    pub fn content_length(&self) -> usize {
        self.content
            .as_deref()
            .unwrap_or(&self.description)
            .chars()
            .count()
    }
}

/// Count of results sharing one facet value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacetBucket {
    pub value: String,
    pub count: u64,
}

/// Facet name to buckets, in engine order
pub type Facets = IndexMap<String, Vec<FacetBucket>>;

/// Fused response returned to callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    /// Wall time spent producing the response, in milliseconds
    pub search_time: u64,
    pub search_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<Facets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_response: Option<RagResponse>,
}

/// Completion suggestion for a partial query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub text: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub score: f32,
}

/// A frequently issued query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PopularSearch {
    pub query: String,
    pub count: u64,
}

/// A user opening one result of a search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClickThroughEvent {
    pub search_id: Uuid,
    pub result_id: String,
    pub position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_filters_are_unrestricted() {
        assert!(SearchFilters::default().is_empty());

        let filters = SearchFilters {
            tags: vec!["rust".to_string()],
            ..Default::default()
        };
        assert!(!filters.is_empty());
    }

    #[test]
    fn test_filter_validation() {
        let filters = SearchFilters {
            min_score: Some(1.5),
            ..Default::default()
        };
        assert_eq!(filters.validate(), Err(ValidationError::InvalidMinScore(1.5)));

        let filters = SearchFilters {
            date_range: Some(DateRange {
                from: Some(Utc::now()),
                to: Some(Utc::now() - chrono::Duration::days(1)),
            }),
            ..Default::default()
        };
        assert_eq!(filters.validate(), Err(ValidationError::InvalidDateRange));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: SearchRequest = serde_json::from_value(json!({
            "query": "machine learning",
            "type": "rag",
            "options": {"includeRAG": true, "limit": 5}
        }))
        .unwrap();

        assert_eq!(request.strategy, Some(StrategyKind::Rag));
        assert_eq!(request.options.page, 1);
        assert_eq!(request.options.limit, Some(5));
        assert!(request.options.include_highlights);
        assert!(request.options.include_rag);
    }

    #[test]
    fn test_chunk_id_from_metadata() {
        let mut source = ResultSource::new(SourceKind::Vector, "doc-1");
        assert_eq!(source.chunk_id(), None);

        source.metadata.insert("chunkId".to_string(), json!("c-2"));
        assert_eq!(source.chunk_id(), Some("c-2".to_string()));

        source.metadata.insert("chunkId".to_string(), json!(7));
        assert_eq!(source.chunk_id(), Some("7".to_string()));
    }

    #[test]
    fn test_lenient_content_type() {
        assert_eq!(ContentType::parse_lenient("video"), ContentType::Video);
        assert_eq!(ContentType::parse_lenient("podcast"), ContentType::Document);
    }
}
