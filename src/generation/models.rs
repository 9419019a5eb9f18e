//! Request and response bodies of the generation service

use crate::config::GenerationConfig;
use serde::{Deserialize, Serialize};

/// Per-call generation settings
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub include_reasoning: bool,
    pub include_follow_ups: bool,
}

impl From<&GenerationConfig> for GenerationOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_answer_tokens,
            include_reasoning: false,
            include_follow_ups: true,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPassage<'a> {
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
    pub source: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest<'a> {
    pub question: &'a str,
    pub contexts: Vec<ContextPassage<'a>>,
    pub model: &'a str,
    pub temperature: f32,
    pub max_tokens: usize,
    pub include_reasoning: bool,
    pub include_follow_ups: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub answer: String,
    pub confidence: f32,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
    /// Indices into the submitted contexts that the answer cites
    #[serde(default)]
    pub cited_sources: Vec<usize>,
}

#[derive(Debug, Serialize)]
pub struct ExpandRequest<'a> {
    pub query: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandResponse {
    pub expanded_query: String,
}
