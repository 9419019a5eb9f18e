//! HTTP surface over the search service

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::build_router;
