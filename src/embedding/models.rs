//! Wire format of the OpenAI-compatible embeddings endpoint

use crate::error::EmbeddingError;
use serde::{Deserialize, Serialize};

/// Request body; texts are always sent as an array, even for one query
#[derive(Debug, Serialize)]
pub struct EmbeddingRequest<'a> {
    pub input: Vec<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
}

impl<'a> EmbeddingRequest<'a> {
    pub fn new<I>(texts: I, model: Option<&'a str>) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self {
            input: texts.into_iter().collect(),
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingResponse {
    pub data: Vec<EmbeddingData>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingData {
    pub embedding: Vec<f32>,
    /// Position of the source text in the request
    pub index: usize,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EmbeddingUsage {
    pub prompt_tokens: usize,
    pub total_tokens: usize,
}

impl EmbeddingResponse {
    /// Vectors in request order.
    ///
    /// Fails unless every requested position appears exactly once.
    pub fn into_vectors(self, requested: usize) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.data.len() != requested {
            return Err(EmbeddingError::ApiError(format!(
                "Requested {} embeddings, received {}",
                requested,
                self.data.len()
            )));
        }

        let mut slots: Vec<Option<Vec<f32>>> = vec![None; requested];
        for item in self.data {
            let slot = slots.get_mut(item.index).ok_or_else(|| {
                EmbeddingError::ApiError(format!("Embedding index {} out of range", item.index))
            })?;
            if slot.replace(item.embedding).is_some() {
                return Err(EmbeddingError::ApiError(format!(
                    "Duplicate embedding index {}",
                    item.index
                )));
            }
        }

        // Every slot is filled: counts match and no index repeated
        Ok(slots.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(body: serde_json::Value) -> EmbeddingResponse {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_single_query_is_sent_as_array() {
        let body = serde_json::to_value(EmbeddingRequest::new(["rust ownership"], None)).unwrap();
        assert_eq!(body, json!({"input": ["rust ownership"]}));

        let body = serde_json::to_value(EmbeddingRequest::new(["a", "b"], Some("e5-large"))).unwrap();
        assert_eq!(body, json!({"input": ["a", "b"], "model": "e5-large"}));
    }

    #[test]
    fn test_vectors_follow_request_order() {
        let vectors = response(json!({"data": [
            {"embedding": [0.0, 1.0], "index": 1},
            {"embedding": [1.0, 0.0], "index": 0}
        ]}))
        .into_vectors(2)
        .unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_short_or_inconsistent_responses_rejected() {
        let short = response(json!({"data": [{"embedding": [1.0], "index": 0}]}));
        assert!(short.into_vectors(2).is_err());

        let repeated = response(json!({"data": [
            {"embedding": [1.0], "index": 0},
            {"embedding": [2.0], "index": 0}
        ]}));
        assert!(repeated.into_vectors(2).is_err());

        let out_of_range = response(json!({"data": [{"embedding": [1.0], "index": 3}]}));
        assert!(out_of_range.into_vectors(1).is_err());
    }
}
