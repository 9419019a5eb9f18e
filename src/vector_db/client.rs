//! Qdrant client implementation

use super::models::{fields, VectorRecord, VectorSearchResult};
use super::VectorStore;
use crate::config::VectorDbConfig;
use crate::error::{Result, VectorSearchError};
use crate::search::models::SearchFilters;
use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config;
use qdrant_client::qdrant::vectors_output::VectorsOptions;
use qdrant_client::qdrant::with_payload_selector::SelectorOptions;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId, PointStruct,
    Range, ScrollPointsBuilder, SearchPoints, UpsertPointsBuilder, Value, VectorParamsBuilder,
    VectorsConfig, WithPayloadSelector,
};
use qdrant_client::{Payload, Qdrant};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Rows written per upsert request
const UPSERT_BATCH: usize = 100;

/// Vector store backed by a Qdrant collection using cosine distance
pub struct QdrantVectorStore {
    config: VectorDbConfig,
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Create a new vector store client
    pub fn new(config: VectorDbConfig) -> Result<Self> {
        info!("Connecting to Qdrant at {}", config.url);

        let mut builder = Qdrant::from_url(&config.url).timeout(Duration::from_secs(config.timeout_secs));
        if let Some(key) = &config.api_key {
            builder = builder.api_key(key.expose_secret().clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorSearchError::new("connect", e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Create the collection if it does not exist yet
    pub async fn ensure_collection(&self) -> Result<()> {
        let name = self.config.collection.clone();
        let exists = self.client.collection_info(name.clone()).await.is_ok();

        if exists {
            debug!("Collection already exists: {}", name);
            return Ok(());
        }

        info!("Creating collection: {}", name);
        let vector_params = VectorParamsBuilder::new(self.config.vector_size as u64, Distance::Cosine).build();

        self.client
            .create_collection(CreateCollectionBuilder::new(name.clone()).vectors_config(VectorsConfig {
                config: Some(Config::Params(vector_params)),
            }))
            .await
            .map_err(|e| VectorSearchError::new("create_collection", e.to_string()))?;

        info!("Collection created: {}", name);
        Ok(())
    }

    fn to_qdrant_filter(filters: &SearchFilters) -> Option<Filter> {
        let mut must = Vec::new();

        if !filters.content_types.is_empty() {
            let types: Vec<String> = filters.content_types.iter().map(|t| t.as_str().to_string()).collect();
            must.push(Condition::matches(fields::CONTENT_TYPE, types));
        }
        for (field, values) in [
            (fields::COURSE_ID, &filters.course_ids),
            (fields::MODULE_ID, &filters.module_ids),
            (fields::TAGS, &filters.tags),
            (fields::CATEGORIES, &filters.categories),
        ] {
            if !values.is_empty() {
                must.push(Condition::matches(field, values.clone()));
            }
        }
        if let Some(language) = &filters.language {
            must.push(Condition::matches(fields::LANGUAGE, language.clone()));
        }
        if let Some(range) = &filters.date_range {
            if range.from.is_some() || range.to.is_some() {
                must.push(Condition::range(
                    fields::CREATED_AT,
                    Range {
                        gte: range.from.map(|d| d.timestamp() as f64),
                        lte: range.to.map(|d| d.timestamp() as f64),
                        ..Default::default()
                    },
                ));
            }
        }

        if must.is_empty() {
            None
        } else {
            Some(Filter::must(must))
        }
    }

    fn content_filter(content_ids: &[String]) -> Filter {
        Filter::must([Condition::matches(fields::CONTENT_ID, content_ids.to_vec())])
    }

    fn point_id_string(id: Option<PointId>) -> String {
        match id.and_then(|p| p.point_id_options) {
            Some(PointIdOptions::Num(num)) => num.to_string(),
            Some(PointIdOptions::Uuid(uuid)) => uuid,
            None => String::new(),
        }
    }
}

/// Convert a Qdrant payload value to JSON
fn to_json(value: Value) -> serde_json::Value {
    match value.kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::IntegerValue(i)) => serde_json::Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::ListValue(list)) => serde_json::Value::Array(list.values.into_iter().map(to_json).collect()),
        Some(Kind::StructValue(st)) => serde_json::Value::Object(
            st.fields.into_iter().map(|(k, v)| (k, to_json(v))).collect(),
        ),
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

fn parse_payload(payload: HashMap<String, Value>) -> HashMap<String, serde_json::Value> {
    payload.into_iter().map(|(k, v)| (k, to_json(v))).collect()
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        threshold: f32,
        filters: &SearchFilters,
    ) -> Result<Vec<VectorSearchResult>> {
        debug!("Searching collection {} with limit {}", self.config.collection, limit);

        let search_points = SearchPoints {
            collection_name: self.config.collection.clone(),
            vector: vector.to_vec(),
            limit: limit as u64,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(SelectorOptions::Enable(true)),
            }),
            score_threshold: Some(threshold),
            filter: Self::to_qdrant_filter(filters),
            ..Default::default()
        };

        let response = self
            .client
            .search_points(search_points)
            .await
            .map_err(|e| VectorSearchError::new("search", e.to_string()))?;

        let results: Vec<VectorSearchResult> = response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = Self::point_id_string(point.id);
                VectorSearchResult::from_payload(id, point.score, parse_payload(point.payload))
            })
            .collect();

        debug!("Found {} results", results.len());
        Ok(results)
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        for batch in records.chunks(UPSERT_BATCH) {
            let mut points = Vec::with_capacity(batch.len());
            for record in batch {
                let payload = Payload::try_from(serde_json::Value::Object(record.payload()))
                    .map_err(|e| VectorSearchError::new("upsert", e.to_string()).with_content(record.content_id.clone()))?;
                points.push(PointStruct::new(
                    record.point_id().to_string(),
                    record.embedding.clone(),
                    payload,
                ));
            }

            debug!("Upserting {} points into {}", points.len(), self.config.collection);
            self.client
                .upsert_points(UpsertPointsBuilder::new(self.config.collection.clone(), points).build())
                .await
                .map_err(|e| VectorSearchError::new("upsert", e.to_string()))?;
        }

        Ok(())
    }

    async fn delete_by_content(&self, content_ids: &[String]) -> Result<()> {
        if content_ids.is_empty() {
            return Ok(());
        }

        debug!("Deleting rows of {} content items", content_ids.len());
        let request = DeletePointsBuilder::new(self.config.collection.clone())
            .points(Self::content_filter(content_ids))
            .build();

        self.client
            .delete_points(request)
            .await
            .map_err(|e| VectorSearchError::new("delete", e.to_string()))?;

        Ok(())
    }

    async fn get_embedding(&self, content_id: &str) -> Result<Option<Vec<f32>>> {
        let request = ScrollPointsBuilder::new(self.config.collection.clone())
            .filter(Self::content_filter(&[content_id.to_string()]))
            .limit(1)
            .with_payload(false)
            .with_vectors(true)
            .build();

        let response = self
            .client
            .scroll(request)
            .await
            .map_err(|e| VectorSearchError::new("get_embedding", e.to_string()).with_content(content_id))?;

        let vector = response.result.into_iter().next().and_then(|point| {
            match point.vectors.and_then(|v| v.vectors_options) {
                Some(VectorsOptions::Vector(vector)) => Some(vector.data),
                _ => None,
            }
        });

        Ok(vector)
    }

    async fn health(&self) -> Result<()> {
        self.client
            .health_check()
            .await
            .map_err(|e| VectorSearchError::new("health", e.to_string()))?;
        Ok(())
    }
}
