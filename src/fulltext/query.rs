//! Translation of engine queries into the engine's query DSL

use super::models::{EngineQuery, FACET_FIELDS};
use crate::config::EngineConfig;
use crate::search::models::{SearchFilters, SortDirection, SortField, SortSpec};
use serde_json::{json, Map, Value};

/// Buckets returned per facet
const FACET_SIZE: usize = 20;

/// Name of the completion suggester in suggest requests
pub const SUGGESTER_NAME: &str = "content-suggest";

/// Builds request bodies from engine queries
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    fields: Vec<String>,
    fragment_size: usize,
    fragments: usize,
}

impl QueryBuilder {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            fields: config.boosted_fields(),
            fragment_size: config.highlight_fragment_size,
            fragments: config.highlight_fragments,
        }
    }

    /// Full `_search` body for a keyword query
    pub fn build(&self, query: &EngineQuery) -> Value {
        let mut body = Map::new();
        body.insert("from".into(), json!(query.from));
        body.insert("size".into(), json!(query.size));
        body.insert("track_total_hits".into(), json!(true));

        let mut bool_query = Map::new();
        bool_query.insert(
            "must".into(),
            json!([{
                "multi_match": {
                    "query": query.text,
                    "fields": self.fields,
                    "type": "best_fields",
                    "fuzziness": "AUTO",
                    "operator": "or"
                }
            }]),
        );

        let filters = filter_clauses(&query.filters);
        if !filters.is_empty() {
            bool_query.insert("filter".into(), Value::Array(filters));
        }
        body.insert("query".into(), json!({ "bool": bool_query }));

        if query.include_highlights {
            body.insert("highlight".into(), self.highlight());
        }

        if query.include_facets {
            body.insert("aggs".into(), aggregations());
        }

        if let Some(sort) = query.sort.filter(|s| s.field != SortField::Relevance) {
            body.insert("sort".into(), sort_clause(&sort));
            body.insert("track_scores".into(), json!(true));
        }

        Value::Object(body)
    }

    /// Completion suggester body
    pub fn build_suggest(&self, partial: &str, kind: Option<&str>, limit: usize) -> Value {
        let mut completion = json!({
            "field": "suggest",
            "size": limit,
            "skip_duplicates": true,
            "fuzzy": {"fuzziness": "AUTO"}
        });
        if let Some(kind) = kind {
            completion["contexts"] = json!({ "content_type": [kind] });
        }

        json!({
            "_source": ["content_type"],
            "suggest": {
                SUGGESTER_NAME: {
                    "prefix": partial,
                    "completion": completion
                }
            }
        })
    }

    fn highlight(&self) -> Value {
        json!({
            "pre_tags": ["<em>"],
            "post_tags": ["</em>"],
            "fields": {
                "title": {"number_of_fragments": 0},
                "description": {
                    "fragment_size": self.fragment_size,
                    "number_of_fragments": self.fragments
                },
                "content": {
                    "fragment_size": self.fragment_size,
                    "number_of_fragments": self.fragments
                }
            }
        })
    }
}

/// Hard constraints as `filter` clauses; an empty filter set yields none
pub fn filter_clauses(filters: &SearchFilters) -> Vec<Value> {
    let mut clauses = Vec::new();

    if !filters.content_types.is_empty() {
        let types: Vec<&str> = filters.content_types.iter().map(|t| t.as_str()).collect();
        clauses.push(json!({"terms": {"content_type": types}}));
    }

    for (field, values) in [
        ("course_id", &filters.course_ids),
        ("module_id", &filters.module_ids),
        ("tags", &filters.tags),
        ("categories", &filters.categories),
    ] {
        if !values.is_empty() {
            clauses.push(json!({"terms": {field: values}}));
        }
    }

    if let Some(language) = &filters.language {
        clauses.push(json!({"term": {"language": language}}));
    }

    if let Some(range) = &filters.date_range {
        let mut bounds = Map::new();
        if let Some(from) = range.from {
            bounds.insert("gte".into(), json!(from.to_rfc3339()));
        }
        if let Some(to) = range.to {
            bounds.insert("lte".into(), json!(to.to_rfc3339()));
        }
        if !bounds.is_empty() {
            clauses.push(json!({"range": {"created_at": bounds}}));
        }
    }

    clauses
}

fn aggregations() -> Value {
    let aggs: Map<String, Value> = FACET_FIELDS
        .iter()
        .map(|(name, field)| {
            (
                name.to_string(),
                json!({"terms": {"field": field, "size": FACET_SIZE}}),
            )
        })
        .collect();
    Value::Object(aggs)
}

fn sort_clause(sort: &SortSpec) -> Value {
    let order = match sort.direction {
        SortDirection::Asc => "asc",
        SortDirection::Desc => "desc",
    };
    let field = match sort.field {
        SortField::CreatedAt => "created_at",
        SortField::UpdatedAt => "updated_at",
        SortField::Title => "title.keyword",
        SortField::Relevance => "_score",
    };
    json!([{ field: {"order": order} }, "_score"])
}
