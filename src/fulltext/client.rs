//! Elasticsearch/OpenSearch REST adapter

use super::models::*;
use super::query::QueryBuilder;
use super::response::{parse_search_response, parse_suggest_response};
use super::{FullTextEngine, IndexAdmin};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::search::models::Suggestion;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct ElasticsearchEngine {
    config: EngineConfig,
    http_client: Client,
    builder: QueryBuilder,
}

#[derive(Debug, Deserialize)]
struct CatIndexRow {
    index: String,
    #[serde(default)]
    health: String,
    #[serde(default)]
    status: String,
    #[serde(rename = "docs.count", default)]
    docs_count: Option<String>,
    #[serde(rename = "store.size", default)]
    store_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

impl ElasticsearchEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(EngineError::Network)?;

        info!("Initialized full-text engine adapter for {} (index: {})", config.url, config.read_target());

        Ok(Self {
            builder: QueryBuilder::new(&config),
            config,
            http_client,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.config.url.trim_end_matches('/'), path.trim_start_matches('/'));
        let request = self.http_client.request(method, url);
        match &self.config.api_key {
            Some(key) => request.header("Authorization", format!("ApiKey {}", key.expose_secret())),
            None => request,
        }
    }

    /// Send and return the body of a successful response
    async fn send(&self, request: RequestBuilder, index: &str) -> Result<String> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if status.is_success() {
            Ok(body)
        } else {
            warn!("Engine returned {} for index {}: {}", status, index, body);
            Err(EngineError::from_status(status.as_u16(), index, body).into())
        }
    }

    /// Document body with the completion input the suggester reads
    fn document_body(document: &IndexedDocument) -> Result<Value> {
        let mut body = serde_json::to_value(document)
            .map_err(|e| EngineError::MalformedResponse(e.to_string()))?;

        let mut inputs = vec![document.title.clone()];
        inputs.extend(document.tags.iter().cloned());
        inputs.retain(|s| !s.trim().is_empty());
        body["suggest"] = json!({ "input": inputs });

        Ok(body)
    }
}

fn map_transport_error(err: reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::Timeout
    } else {
        EngineError::Network(err)
    }
}

#[async_trait]
impl FullTextEngine for ElasticsearchEngine {
    async fn search(&self, query: &EngineQuery) -> Result<EngineResponse> {
        let target = self.config.read_target();
        let body = self.builder.build(query);
        debug!("Full-text search on {} for '{}'", target, query.text);

        let text = self
            .send(self.request(Method::POST, &format!("{}/_search", target)).json(&body), target)
            .await?;

        let response = parse_search_response(&text, query.filters.min_score)?;
        debug!("Engine returned {} hits in {}ms", response.results.len(), response.took_ms);
        Ok(response)
    }

    async fn suggest(&self, partial: &str, kind: Option<&str>, limit: usize) -> Result<Vec<Suggestion>> {
        let target = self.config.read_target();
        let body = self.builder.build_suggest(partial, kind, limit);

        let text = self
            .send(self.request(Method::POST, &format!("{}/_search", target)).json(&body), target)
            .await?;

        let mut suggestions = parse_suggest_response(&text)?;
        suggestions.truncate(limit);
        Ok(suggestions)
    }

    async fn health(&self) -> Result<EngineHealth> {
        let text = self.send(self.request(Method::GET, "_cluster/health"), "_cluster").await?;
        serde_json::from_str(&text).map_err(|e| EngineError::MalformedResponse(e.to_string()).into())
    }
}

#[async_trait]
impl IndexAdmin for ElasticsearchEngine {
    async fn index_document(&self, document: &IndexedDocument) -> Result<()> {
        let index = &self.config.index;
        let body = Self::document_body(document)?;
        self.send(
            self.request(Method::PUT, &format!("{}/_doc/{}", index, document.id)).json(&body),
            index,
        )
        .await?;
        Ok(())
    }

    async fn bulk_index(&self, documents: &[IndexedDocument]) -> Result<BulkReport> {
        if documents.is_empty() {
            return Ok(BulkReport::default());
        }

        let index = &self.config.index;
        let mut ndjson = String::new();
        for document in documents {
            let action = json!({"index": {"_index": index, "_id": document.id}});
            ndjson.push_str(&action.to_string());
            ndjson.push('\n');
            ndjson.push_str(&Self::document_body(document)?.to_string());
            ndjson.push('\n');
        }

        let text = self
            .send(
                self.request(Method::POST, "_bulk")
                    .header("Content-Type", "application/x-ndjson")
                    .body(ndjson),
                index,
            )
            .await?;

        let response: BulkResponse =
            serde_json::from_str(&text).map_err(|e| EngineError::MalformedResponse(e.to_string()))?;

        let mut report = BulkReport::default();
        for item in &response.items {
            match item.get("index").and_then(|i| i.get("error")) {
                Some(error) => {
                    report.failed += 1;
                    report.errors.push(error.to_string());
                }
                None => report.indexed += 1,
            }
        }

        if response.errors {
            warn!("Bulk index finished with {} failures", report.failed);
        } else {
            info!("Bulk indexed {} documents", report.indexed);
        }
        Ok(report)
    }

    async fn update_document(&self, id: &str, partial: Value) -> Result<()> {
        let index = &self.config.index;
        self.send(
            self.request(Method::POST, &format!("{}/_update/{}", index, id))
                .json(&json!({ "doc": partial })),
            index,
        )
        .await?;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let index = &self.config.index;
        let response = self
            .request(Method::DELETE, &format!("{}/_doc/{}", index, id))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if status.is_success() {
            return Ok(true);
        }

        // A missing document answers 404 with result=not_found; a missing index has no result
        if status == StatusCode::NOT_FOUND {
            let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            if parsed.get("result").and_then(Value::as_str) == Some("not_found") {
                return Ok(false);
            }
        }

        Err(EngineError::from_status(status.as_u16(), index, body).into())
    }

    async fn create_index(&self, name: &str, definition: Value) -> Result<()> {
        self.send(self.request(Method::PUT, name).json(&definition), name).await?;
        info!("Created index {}", name);
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, name), name).await?;
        info!("Deleted index {}", name);
        Ok(())
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        let response = self
            .request(Method::HEAD, name)
            .send()
            .await
            .map_err(map_transport_error)?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(EngineError::from_status(status.as_u16(), name, String::new()).into()),
        }
    }

    async fn index_status(&self, name: &str) -> Result<IndexStatus> {
        let text = self
            .send(self.request(Method::GET, &format!("_cat/indices/{}?format=json", name)), name)
            .await?;

        let rows: Vec<CatIndexRow> =
            serde_json::from_str(&text).map_err(|e| EngineError::MalformedResponse(e.to_string()))?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::IndexNotFound(name.to_string()))?;

        Ok(IndexStatus {
            index: row.index,
            health: row.health,
            status: row.status,
            docs_count: row.docs_count.and_then(|c| c.parse().ok()).unwrap_or(0),
            store_size: row.store_size,
        })
    }

    async fn put_mapping(&self, name: &str, mapping: Value) -> Result<()> {
        self.send(self.request(Method::PUT, &format!("{}/_mapping", name)).json(&mapping), name)
            .await?;
        Ok(())
    }

    async fn put_settings(&self, name: &str, settings: Value) -> Result<()> {
        self.send(self.request(Method::PUT, &format!("{}/_settings", name)).json(&settings), name)
            .await?;
        Ok(())
    }

    async fn update_alias(&self, alias: &str, new_index: &str, old_index: Option<&str>) -> Result<()> {
        let mut actions = Vec::new();
        if let Some(old) = old_index {
            actions.push(json!({"remove": {"index": old, "alias": alias}}));
        }
        actions.push(json!({"add": {"index": new_index, "alias": alias}}));

        self.send(
            self.request(Method::POST, "_aliases").json(&json!({ "actions": actions })),
            new_index,
        )
        .await?;

        info!("Alias {} now points at {}", alias, new_index);
        Ok(())
    }
}
