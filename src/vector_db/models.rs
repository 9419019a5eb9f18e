//! Data models for vector store operations

use crate::search::models::SearchFilters;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

/// Payload field names shared by every store backend
pub mod fields {
    pub const CONTENT_ID: &str = "content_id";
    pub const CHUNK_ID: &str = "chunk_id";
    pub const TEXT: &str = "text";
    pub const TITLE: &str = "title";
    pub const CONTENT_TYPE: &str = "content_type";
    pub const COURSE_ID: &str = "course_id";
    pub const MODULE_ID: &str = "module_id";
    pub const TAGS: &str = "tags";
    pub const CATEGORIES: &str = "categories";
    pub const LANGUAGE: &str = "language";
    /// Unix seconds
    pub const CREATED_AT: &str = "created_at";
}

/// One embedded row to store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub content_id: String,
    pub chunk_id: Option<String>,
    pub text: String,
    pub embedding: Vec<f32>,
    /// Filterable attributes (content type, course, tags, ...)
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl VectorRecord {
    pub fn new(content_id: impl Into<String>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            content_id: content_id.into(),
            chunk_id: None,
            text: text.into(),
            embedding,
            metadata: HashMap::new(),
        }
    }

    pub fn with_chunk(mut self, chunk_id: impl Into<String>) -> Self {
        self.chunk_id = Some(chunk_id.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Stable point id derived from (content id, chunk id), so re-storing a
    /// row overwrites it
    pub fn point_id(&self) -> Uuid {
        let mut hasher = Sha256::new();
        hasher.update(self.content_id.as_bytes());
        hasher.update(b"#");
        hasher.update(self.chunk_id.as_deref().unwrap_or("").as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Uuid::from_bytes(bytes)
    }

    /// Full payload as stored alongside the vector
    pub fn payload(&self) -> serde_json::Map<String, Value> {
        let mut payload: serde_json::Map<String, Value> = self
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        payload.insert(fields::CONTENT_ID.to_string(), Value::String(self.content_id.clone()));
        payload.insert(fields::TEXT.to_string(), Value::String(self.text.clone()));
        if let Some(chunk_id) = &self.chunk_id {
            payload.insert(fields::CHUNK_ID.to_string(), Value::String(chunk_id.clone()));
        }
        payload
    }
}

/// Nearest-neighbour hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearchResult {
    pub id: String,
    pub content_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub text: String,
    /// Cosine similarity in [0, 1]
    pub similarity: f32,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl VectorSearchResult {
    /// Build a hit from a stored payload; `None` when required fields are missing
    pub fn from_payload(id: String, similarity: f32, mut payload: HashMap<String, Value>) -> Option<Self> {
        let content_id = take_string(&mut payload, fields::CONTENT_ID)?;
        let text = take_string(&mut payload, fields::TEXT)?;
        let chunk_id = take_string(&mut payload, fields::CHUNK_ID);

        Some(Self {
            id,
            content_id,
            chunk_id,
            text,
            similarity: similarity.clamp(0.0, 1.0),
            metadata: payload,
        })
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn metadata_strings(&self, key: &str) -> Vec<String> {
        match self.metadata.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

fn take_string(payload: &mut HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.remove(key)? {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Evaluate search filters against a stored payload.
///
/// Used by backends without native filtering; an empty filter matches all.
pub fn payload_matches(filters: &SearchFilters, payload: &serde_json::Map<String, Value>) -> bool {
    let str_field = |key: &str| payload.get(key).and_then(Value::as_str);
    let any_of = |key: &str, wanted: &[String]| -> bool {
        if wanted.is_empty() {
            return true;
        }
        match payload.get(key) {
            Some(Value::String(s)) => wanted.iter().any(|w| w == s),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .any(|item| wanted.iter().any(|w| w == item)),
            _ => false,
        }
    };

    if !filters.content_types.is_empty() {
        let matched = str_field(fields::CONTENT_TYPE)
            .map(|ct| filters.content_types.iter().any(|wanted| wanted.as_str() == ct))
            .unwrap_or(false);
        if !matched {
            return false;
        }
    }

    if !any_of(fields::COURSE_ID, &filters.course_ids)
        || !any_of(fields::MODULE_ID, &filters.module_ids)
        || !any_of(fields::TAGS, &filters.tags)
        || !any_of(fields::CATEGORIES, &filters.categories)
    {
        return false;
    }

    if let Some(language) = &filters.language {
        if str_field(fields::LANGUAGE) != Some(language.as_str()) {
            return false;
        }
    }

    if let Some(range) = &filters.date_range {
        let created = payload.get(fields::CREATED_AT).and_then(Value::as_i64);
        match created {
            Some(ts) => {
                if range.from.map(|from| ts < from.timestamp()).unwrap_or(false)
                    || range.to.map(|to| ts > to.timestamp()).unwrap_or(false)
                {
                    return false;
                }
            }
            None if range.from.is_some() || range.to.is_some() => return false,
            None => {}
        }
    }

    true
}
