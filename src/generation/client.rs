//! HTTP client for the answer generation service

use super::models::*;
use super::{GenerationProvider, QueryExpander};
use crate::config::GenerationConfig;
use crate::error::{RagError, Result};
use crate::rag::{RagContext, RagResponse};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct GenerationClient {
    config: GenerationConfig,
    http_client: Client,
}

impl GenerationClient {
    pub fn new(config: GenerationConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(RagError::Network)?;

        info!("Initialized generation client for {}", config.api_url);
        Ok(Self { config, http_client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let response = self
            .http_client
            .post(self.endpoint(path))
            .bearer_auth(self.config.api_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(RagError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("Generation service returned {} for /{}: {}", status, path, text);
            return Err(RagError::Generation(format!("Status {}: {}", status, text)).into());
        }

        let body = response.text().await.map_err(RagError::Network)?;
        serde_json::from_str(&body).map_err(|e| RagError::MalformedResponse(e.to_string()).into())
    }
}

#[async_trait]
impl GenerationProvider for GenerationClient {
    async fn generate(
        &self,
        question: &str,
        contexts: &[RagContext],
        options: &GenerationOptions,
    ) -> Result<RagResponse> {
        if contexts.is_empty() {
            return Err(RagError::NoContexts.into());
        }

        let request = GenerateRequest {
            question,
            contexts: contexts
                .iter()
                .map(|c| ContextPassage {
                    text: &c.text,
                    title: c.metadata.title.as_deref(),
                    source: &c.metadata.content_id,
                })
                .collect(),
            model: &options.model,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            include_reasoning: options.include_reasoning,
            include_follow_ups: options.include_follow_ups,
        };

        debug!("Requesting answer over {} contexts", contexts.len());
        let response: GenerateResponse = self.post("generate", &request).await?;

        // Cited indices select and order the sources; no citations means all were used
        let sources: Vec<RagContext> = if response.cited_sources.is_empty() {
            contexts.to_vec()
        } else {
            response
                .cited_sources
                .iter()
                .filter_map(|&i| contexts.get(i).cloned())
                .collect()
        };

        Ok(RagResponse {
            answer: response.answer,
            sources,
            confidence: response.confidence.clamp(0.0, 1.0),
            model: response.model.unwrap_or_else(|| options.model.clone()),
            reasoning: response.reasoning,
            follow_up_questions: response.follow_up_questions,
        })
    }
}

#[async_trait]
impl QueryExpander for GenerationClient {
    async fn expand(&self, query: &str) -> Result<String> {
        let response: ExpandResponse = self.post("expand", &ExpandRequest { query }).await?;
        let expanded = response.expanded_query.trim();

        if expanded.is_empty() {
            return Err(RagError::MalformedResponse("empty expansion".to_string()).into());
        }
        Ok(expanded.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::RagContextMetadata;
    use serde_json::json;

    fn config(url: String) -> GenerationConfig {
        GenerationConfig {
            api_url: url,
            api_token: secrecy::Secret::new("token".to_string()),
            model: "answer-small".to_string(),
            temperature: 0.2,
            max_answer_tokens: 512,
            timeout_secs: 5,
        }
    }

    fn context(id: &str) -> RagContext {
        RagContext {
            text: format!("Passage from {}", id),
            metadata: RagContextMetadata {
                content_id: id.to_string(),
                title: Some(format!("Title {}", id)),
                ..Default::default()
            },
            relevance_score: 0.9,
        }
    }

    #[tokio::test]
    async fn test_generate_maps_citations() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/generate")
            .match_header("authorization", "Bearer token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "answer": "Gradient descent minimizes loss.",
                    "confidence": 0.82,
                    "followUpQuestions": ["What is a learning rate?"],
                    "citedSources": [1]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = GenerationClient::new(config(server.url())).unwrap();
        let options = GenerationOptions::from(&config(server.url()));
        let response = client
            .generate("what is gradient descent", &[context("a"), context("b")], &options)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.answer, "Gradient descent minimizes loss.");
        assert_eq!(response.model, "answer-small");
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].metadata.content_id, "b");
        assert_eq!(response.follow_up_questions.len(), 1);
    }

    #[tokio::test]
    async fn test_generate_requires_contexts() {
        let client = GenerationClient::new(config("http://localhost:1".to_string())).unwrap();
        let options = GenerationOptions::from(&config(String::new()));
        let err = client.generate("q", &[], &options).await.unwrap_err();
        assert!(matches!(err, crate::error::SearchError::Rag(RagError::NoContexts)));
    }

    #[tokio::test]
    async fn test_server_error_surfaces() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/generate")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client = GenerationClient::new(config(server.url())).unwrap();
        let options = GenerationOptions::from(&config(server.url()));
        let err = client.generate("q", &[context("a")], &options).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_expand() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/expand")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"expandedQuery": " machine learning ML algorithms "}).to_string())
            .create_async()
            .await;

        let client = GenerationClient::new(config(format!("{}/", server.url()))).unwrap();
        let expanded = client.expand("machine learning").await.unwrap();
        assert_eq!(expanded, "machine learning ML algorithms");
    }
}
