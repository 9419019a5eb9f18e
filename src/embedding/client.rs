//! HTTP embedding client with retries and a local embedding cache

use super::{EmbeddingProvider, QueryEmbeddingCache, models::*};
use crate::config::EmbeddingConfig;
use crate::error::{EmbeddingError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Maximum characters accepted per text
const MAX_TEXT_LENGTH: usize = 8192;

/// Client for an OpenAI-compatible embeddings endpoint
pub struct EmbeddingClient {
    config: EmbeddingConfig,
    http_client: Client,
    cache: Option<Arc<QueryEmbeddingCache>>,
}

impl EmbeddingClient {
    /// Create a new embedding client
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(EmbeddingError::NetworkError)?;

        let cache = if config.cache_enabled {
            Some(Arc::new(QueryEmbeddingCache::new(
                config.model.as_deref(),
                config.cache_size,
                Duration::from_secs(config.cache_ttl_secs),
            )))
        } else {
            None
        };

        info!("Initialized embedding client with cache_enabled={}", config.cache_enabled);

        Ok(Self {
            config,
            http_client,
            cache,
        })
    }

    pub fn cache(&self) -> Option<&QueryEmbeddingCache> {
        self.cache.as_deref()
    }

    fn validate_text(text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()).into());
        }

        if text.len() > MAX_TEXT_LENGTH {
            return Err(EmbeddingError::InvalidInput(format!(
                "Text too long: {} characters (max {})",
                text.len(),
                MAX_TEXT_LENGTH
            ))
            .into());
        }

        Ok(())
    }

    /// Make API request with retry logic
    async fn make_request(&self, request: &EmbeddingRequest<'_>) -> Result<EmbeddingResponse> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.try_request(request).await {
                Ok(response) => {
                    debug!("Embedding request succeeded on attempt {}", attempts);
                    return Ok(response);
                }
                Err(e) if attempts < self.config.max_retries && Self::is_retryable(&e) => {
                    warn!("Embedding request failed on attempt {}: {}", attempts, e);

                    // Exponential backoff with jitter (+/-25%)
                    let delay = (100 * 2_u64.pow(attempts - 1)).min(30_000);
                    let jitter = (delay as f64 * 0.25 * (rand::random::<f64>() - 0.5) * 2.0) as i64;
                    let final_delay = Duration::from_millis((delay as i64 + jitter).max(0) as u64);

                    debug!("Retrying after {}ms", final_delay.as_millis());
                    tokio::time::sleep(final_delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn is_retryable(error: &EmbeddingError) -> bool {
        !matches!(
            error,
            EmbeddingError::AuthenticationFailed | EmbeddingError::InvalidInput(_)
        )
    }

    /// Try to make a single API request
    async fn try_request(&self, request: &EmbeddingRequest<'_>) -> std::result::Result<EmbeddingResponse, EmbeddingError> {
        let response = self.http_client
            .post(&self.config.api_url)
            .bearer_auth(self.config.api_token.expose_secret())
            .json(request)
            .send()
            .await?;

        let status = response.status();

        match status {
            StatusCode::OK => {
                let embedding_response: EmbeddingResponse = response.json().await?;
                debug!("Received {} embeddings", embedding_response.data.len());
                Ok(embedding_response)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("Embedding service authentication failed");
                Err(EmbeddingError::AuthenticationFailed)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Embedding service rate limit exceeded");
                Err(EmbeddingError::RateLimitExceeded)
            }
            _ => {
                let error_text = response.text().await.unwrap_or_default();
                error!("Embedding request failed with status {}: {}", status, error_text);
                Err(EmbeddingError::ApiError(format!("Status {}: {}", status, error_text)))
            }
        }
    }

    /// Embed texts in one upstream request, checking every dimension
    async fn fetch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest::new(texts.iter().copied(), self.config.model.as_deref());
        let response = self.make_request(&request).await?;
        if let Some(usage) = response.usage {
            debug!("Embedding request used {} tokens", usage.total_tokens);
        }

        let embeddings = response.into_vectors(texts.len())?;
        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }
        Ok(embeddings)
    }

    async fn fetch_one(&self, text: &str) -> Result<Vec<f32>> {
        self.fetch(&[text])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::ApiError("No embeddings returned".to_string()).into())
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.config.dimension {
            return Err(EmbeddingError::ApiError(format!(
                "Expected {}-dimensional embedding, got {}",
                self.config.dimension,
                embedding.len()
            ))
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingClient {
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        Self::validate_text(text)?;

        match &self.cache {
            Some(cache) => cache.get_or_fetch(text, self.fetch_one(text)).await,
            None => self.fetch_one(text).await,
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        for text in texts {
            Self::validate_text(text)?;
        }

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut uncached: Vec<(usize, &str)> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let cached = match &self.cache {
                Some(cache) => cache.get(text).await,
                None => None,
            };
            match cached {
                Some(embedding) => results[i] = Some(embedding),
                None => uncached.push((i, text.as_str())),
            }
        }

        for chunk in uncached.chunks(self.config.batch_size) {
            debug!("Fetching {} uncached embeddings", chunk.len());

            let batch: Vec<&str> = chunk.iter().map(|(_, text)| *text).collect();
            let embeddings = self.fetch(&batch).await?;

            for ((index, text), embedding) in chunk.iter().zip(embeddings) {
                if let Some(cache) = &self.cache {
                    cache.insert(text, embedding.clone()).await;
                }
                results[*index] = Some(embedding);
            }
        }

        results
            .into_iter()
            .map(|opt| {
                opt.ok_or_else(|| EmbeddingError::ApiError("Missing embedding in response".to_string()).into())
            })
            .collect()
    }

    fn embedding_dimension(&self) -> usize {
        self.config.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config(url: String) -> EmbeddingConfig {
        EmbeddingConfig {
            api_url: url,
            api_token: secrecy::Secret::new("test".to_string()),
            model: None,
            dimension: 3,
            batch_size: 2,
            timeout_secs: 5,
            max_retries: 2,
            cache_enabled: true,
            cache_ttl_secs: 3600,
            cache_size: 100,
        }
    }

    #[tokio::test]
    async fn test_embed_single_is_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}], "model": "e5"}).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = EmbeddingClient::new(test_config(format!("{}/v1/embeddings", server.url()))).unwrap();

        let first = client.embed_single("machine learning").await.unwrap();
        let second = client.embed_single("machine learning").await.unwrap();

        assert_eq!(first, vec![0.1, 0.2, 0.3]);
        assert_eq!(first, second);
        mock.assert_async().await;

        let stats = client.cache().unwrap().stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_order() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"data": [
                    {"embedding": [0.0, 1.0, 0.0], "index": 1},
                    {"embedding": [1.0, 0.0, 0.0], "index": 0}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let client = EmbeddingClient::new(test_config(format!("{}/v1/embeddings", server.url()))).unwrap();
        let embeddings = client
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(embeddings[0], vec![1.0, 0.0, 0.0]);
        assert_eq!(embeddings[1], vec![0.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let client = EmbeddingClient::new(test_config(format!("{}/v1/embeddings", server.url()))).unwrap();
        let result = client.embed_single("query").await;

        assert!(result.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let client = EmbeddingClient::new(test_config("http://test".to_string())).unwrap();
        let err = client.embed_single("   ").await.unwrap_err();
        assert!(!err.is_transient());
    }
}
