//! Mapping of engine responses back into the common result shape

use super::models::{EngineResponse, IndexedDocument, FACET_FIELDS};
use super::query::SUGGESTER_NAME;
use crate::error::EngineError;
use crate::search::models::{
    ContentType, FacetBucket, Facets, ResultSource, SearchResult, SourceKind, Suggestion,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    #[serde(default)]
    took: u64,
    hits: RawHits,
    #[serde(default)]
    aggregations: Option<HashMap<String, RawAggregation>>,
}

#[derive(Debug, Deserialize)]
struct RawHits {
    #[serde(default)]
    total: Option<RawTotal>,
    #[serde(default)]
    max_score: Option<f32>,
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTotal {
    Object { value: u64 },
    Count(u64),
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f32>,
    #[serde(rename = "_source")]
    source: IndexedDocument,
    #[serde(default)]
    highlight: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawAggregation {
    #[serde(default)]
    buckets: Vec<RawBucket>,
}

#[derive(Debug, Deserialize)]
struct RawBucket {
    key: Value,
    doc_count: u64,
}

#[derive(Debug, Deserialize)]
struct RawSuggestResponse {
    #[serde(default)]
    suggest: HashMap<String, Vec<RawSuggestEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawSuggestEntry {
    #[serde(default)]
    options: Vec<RawSuggestOption>,
}

#[derive(Debug, Deserialize)]
struct RawSuggestOption {
    text: String,
    #[serde(rename = "_score", default)]
    score: f32,
    #[serde(rename = "_source", default)]
    source: Option<Value>,
}

/// Map a `_search` body into results and facets.
///
/// Scores are normalized by the page's max score into [0, 1] so they can
/// be compared with vector similarities during fusion. Missing
/// aggregations produce no facets rather than an error.
pub fn parse_search_response(body: &str, min_score: Option<f32>) -> Result<EngineResponse, EngineError> {
    let raw: RawSearchResponse =
        serde_json::from_str(body).map_err(|e| EngineError::MalformedResponse(e.to_string()))?;

    let max_score = raw
        .hits
        .max_score
        .or_else(|| raw.hits.hits.iter().filter_map(|h| h.score).reduce(f32::max))
        .unwrap_or(0.0);

    let total = match raw.hits.total {
        Some(RawTotal::Object { value }) | Some(RawTotal::Count(value)) => value,
        None => raw.hits.hits.len() as u64,
    };

    let mut results: Vec<SearchResult> = raw
        .hits
        .hits
        .into_iter()
        .map(|hit| map_hit(hit, max_score))
        .collect();

    if let Some(min) = min_score {
        results.retain(|r| r.score >= min);
    }

    let facets = raw.aggregations.map(map_facets);

    Ok(EngineResponse {
        results,
        total,
        facets,
        took_ms: raw.took,
    })
}

fn map_hit(hit: RawHit, max_score: f32) -> SearchResult {
    let raw_score = hit.score.unwrap_or(0.0);
    let score = if max_score > 0.0 {
        (raw_score / max_score).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let mut highlights = Vec::new();
    for field in ["title", "description", "content"] {
        if let Some(fragments) = hit.highlight.get(field) {
            highlights.extend(fragments.iter().cloned());
        }
    }

    let doc = hit.source;
    let source_id = if doc.id.is_empty() { hit.id.clone() } else { doc.id.clone() };

    let mut source = ResultSource::new(SourceKind::FullText, source_id);
    source.url = doc.url.clone();
    source.metadata.insert("engineScore".to_string(), json!(raw_score));
    if let Some(chunk_id) = &doc.chunk_id {
        source.metadata.insert("chunkId".to_string(), json!(chunk_id));
    }

    let now = Utc::now();
    let created_at = doc.created_at.unwrap_or(now);

    SearchResult {
        id: hit.id,
        content_type: ContentType::parse_lenient(&doc.content_type),
        title: doc.title,
        description: doc.description,
        content: doc.content,
        highlights,
        score,
        relevance_score: score,
        semantic_score: None,
        source,
        course_id: doc.course_id,
        module_id: doc.module_id,
        tags: doc.tags,
        categories: doc.categories,
        created_at,
        updated_at: doc.updated_at.unwrap_or(created_at),
    }
}

fn map_facets(mut aggregations: HashMap<String, RawAggregation>) -> Facets {
    let mut facets = Facets::new();
    for (name, _) in FACET_FIELDS {
        if let Some(aggregation) = aggregations.remove(*name) {
            let buckets = aggregation
                .buckets
                .into_iter()
                .map(|b| FacetBucket {
                    value: match b.key {
                        Value::String(s) => s,
                        other => other.to_string(),
                    },
                    count: b.doc_count,
                })
                .collect();
            facets.insert(name.to_string(), buckets);
        }
    }
    facets
}

/// Map a completion-suggester body into suggestions
pub fn parse_suggest_response(body: &str) -> Result<Vec<Suggestion>, EngineError> {
    let raw: RawSuggestResponse =
        serde_json::from_str(body).map_err(|e| EngineError::MalformedResponse(e.to_string()))?;

    let suggestions = raw
        .suggest
        .get(SUGGESTER_NAME)
        .into_iter()
        .flatten()
        .flat_map(|entry| entry.options.iter())
        .map(|option| Suggestion {
            text: option.text.clone(),
            kind: option
                .source
                .as_ref()
                .and_then(|s| s.get("content_type"))
                .and_then(Value::as_str)
                .map(str::to_string),
            score: option.score,
        })
        .collect();

    Ok(suggestions)
}
