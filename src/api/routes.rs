//! API route configuration

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use super::handlers::{self, AppState};

/// Build the complete API router with middleware
pub fn build_router(app_state: AppState, max_body_size: usize) -> Router {
    // Probes and scraping stay outside the body limit
    let public_routes = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(handlers::health))
        .route("/health/live", get(handlers::liveness))
        .route("/health/ready", get(handlers::readiness))
        .route("/metrics", get(handlers::metrics))
        .with_state(app_state.clone());

    let api_routes = Router::new()
        .route("/api/v1/search", post(handlers::search))
        .route("/api/v1/suggestions", get(handlers::suggestions))
        .route("/api/v1/popular", get(handlers::popular))
        .route("/api/v1/click", post(handlers::track_click))
        .route("/api/v1/cache/clear", post(handlers::clear_cache))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body_size)),
        )
        .with_state(app_state);

    public_routes.merge(api_routes)
}

async fn root_handler() -> impl axum::response::IntoResponse {
    axum::Json(serde_json::json!({
        "service": "Retrieval Core",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
