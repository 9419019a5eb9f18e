//! Retrieval-augmented generation: context types, token estimation and
//! budgeted context selection

pub mod context;
pub mod token_estimator;

pub use context::{select_contexts, ContextSelection};
pub use token_estimator::TokenEstimator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provenance of a passage handed to the generation backend
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RagContextMetadata {
    pub content_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A retrieved passage with its relevance to the question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RagContext {
    pub text: String,
    pub metadata: RagContextMetadata,
    pub relevance_score: f32,
}

/// Generated answer with citations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RagResponse {
    pub answer: String,
    pub sources: Vec<RagContext>,
    pub confidence: f32,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_up_questions: Vec<String>,
}
