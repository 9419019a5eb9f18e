//! Normalization and validation of raw search requests

use super::models::{ProcessedQuery, SearchRequest};
use crate::config::SearchConfig;
use crate::error::{Result, ValidationError};
use crate::generation::QueryExpander;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A request that passed validation, before any backend call
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub request: SearchRequest,
    pub limit: usize,
}

/// Turns raw requests into [`ProcessedQuery`] values
pub struct QueryProcessor {
    config: SearchConfig,
    expander: Option<Arc<dyn QueryExpander>>,
}

impl QueryProcessor {
    pub fn new(config: SearchConfig) -> Self {
        Self { config, expander: None }
    }

    /// Enable query expansion through an external expander
    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    /// Trim the query and check every caller-controlled bound.
    ///
    /// Makes no backend calls, so callers can consult caches with the result
    /// before paying for expansion.
    pub fn validate(&self, mut request: SearchRequest) -> Result<ValidatedRequest> {
        request.query = request.query.trim().to_string();

        let length = request.query.chars().count();
        if length < self.config.min_query_length {
            return Err(ValidationError::QueryTooShort {
                length,
                min: self.config.min_query_length,
            }
            .into());
        }
        if length > self.config.max_query_length {
            return Err(ValidationError::QueryTooLong {
                length,
                max: self.config.max_query_length,
            }
            .into());
        }

        let limit = request.options.limit.unwrap_or(self.config.default_limit);
        if limit == 0 || limit > self.config.max_limit {
            return Err(ValidationError::LimitOutOfRange {
                limit,
                max: self.config.max_limit,
            }
            .into());
        }
        let page = request.options.page;
        if page == 0 {
            return Err(ValidationError::InvalidPage.into());
        }
        match page.checked_mul(limit) {
            Some(window) if window <= self.config.max_result_window => {}
            _ => {
                return Err(ValidationError::PageOutOfRange {
                    page,
                    limit,
                    max_window: self.config.max_result_window,
                }
                .into())
            }
        }

        request.filters.validate()?;
        request.options.limit = Some(limit);

        Ok(ValidatedRequest { request, limit })
    }

    /// Expand and tokenize a validated request. Never fails: expansion
    /// errors fall back to the original text.
    pub async fn process_validated(&self, validated: ValidatedRequest) -> ProcessedQuery {
        let ValidatedRequest { request, limit } = validated;
        let search_id = Uuid::new_v4();
        let expanded_query = self.expand(&request.query, search_id).await;

        ProcessedQuery {
            tokens: tokenize(&request.query),
            expanded_query,
            strategy: request.strategy.unwrap_or_default(),
            original_query: request.query,
            filters: request.filters,
            options: request.options,
            context: request.context,
            search_id,
            limit,
        }
    }

    /// Validate then process in one step
    pub async fn process(&self, request: SearchRequest) -> Result<ProcessedQuery> {
        let validated = self.validate(request)?;
        Ok(self.process_validated(validated).await)
    }

    async fn expand(&self, query: &str, search_id: Uuid) -> String {
        let expander = match (&self.expander, self.config.query_expansion) {
            (Some(expander), true) => expander,
            _ => return query.to_string(),
        };

        match expander.expand(query).await {
            Ok(expanded) => {
                debug!(search_id = %search_id, "Expanded '{}' to '{}'", query, expanded);
                expanded
            }
            Err(e) => {
                warn!(search_id = %search_id, "Query expansion failed, using original text: {}", e);
                query.to_string()
            }
        }
    }
}

/// Lower-cased tokens split on whitespace and punctuation
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}
