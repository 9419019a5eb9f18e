//! API request handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::SearchError;
use crate::observability::HealthStatus;
use crate::search::{ClickThroughEvent, SearchRequest, SearchService};

/// Popular searches returned when the caller gives no limit
const DEFAULT_POPULAR_LIMIT: usize = 10;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SearchService>,
}

impl AppState {
    pub fn new(service: Arc<SearchService>) -> Self {
        Self { service }
    }
}

/// Query string for suggestions
#[derive(Debug, Deserialize)]
pub struct SuggestionParams {
    pub q: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PopularParams {
    pub limit: Option<usize>,
}

/// Request to clear cached entries
#[derive(Debug, Default, Deserialize)]
pub struct ClearCacheRequest {
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub cleared: usize,
}

/// Generic error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(e: SearchError) -> Response {
    let status = if e.is_validation() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

/// Run a search
pub async fn search(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> Response {
    match state.service.search(req).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Completion suggestions for a partial query
pub async fn suggestions(
    State(state): State<AppState>,
    Query(params): Query<SuggestionParams>,
) -> Response {
    match state
        .service
        .get_suggestions(&params.q, params.kind.as_deref(), params.limit)
        .await
    {
        Ok(suggestions) => (StatusCode::OK, Json(suggestions)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn popular(State(state): State<AppState>, Query(params): Query<PopularParams>) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_POPULAR_LIMIT);
    let popular = state.service.get_popular_searches(limit).await;
    (StatusCode::OK, Json(popular)).into_response()
}

/// Record a click on a search result
pub async fn track_click(
    State(state): State<AppState>,
    Json(event): Json<ClickThroughEvent>,
) -> Response {
    match state.service.track_click_through(event).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_response(e),
    }
}

/// Clear cached entries, all of them when no pattern is given
pub async fn clear_cache(
    State(state): State<AppState>,
    body: Option<Json<ClearCacheRequest>>,
) -> Response {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let cleared = state.service.clear_cache(req.pattern.as_deref()).await;
    (StatusCode::OK, Json(ClearCacheResponse { cleared })).into_response()
}

pub async fn health(State(state): State<AppState>) -> Response {
    let report = state.service.get_health().await;
    let status_code = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(report)).into_response()
}

/// Liveness probe, always 200
pub async fn liveness() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "alive"}))).into_response()
}

/// Ready while at least one retrieval backend answers
pub async fn readiness(State(state): State<AppState>) -> Response {
    let report = state.service.get_health().await;
    match report.status {
        HealthStatus::Unhealthy => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "not_ready"})),
        )
            .into_response(),
        _ => (StatusCode::OK, Json(serde_json::json!({"status": "ready"}))).into_response(),
    }
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> String {
    state.service.metrics().export_prometheus()
}
