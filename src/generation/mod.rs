//! Generation backend: AI answers over retrieved contexts and query expansion

pub mod client;
pub mod models;

pub use client::GenerationClient;
pub use models::GenerationOptions;

use crate::error::Result;
use crate::rag::{RagContext, RagResponse};
use async_trait::async_trait;

/// Produces an answer to a question from retrieved passages
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(
        &self,
        question: &str,
        contexts: &[RagContext],
        options: &GenerationOptions,
    ) -> Result<RagResponse>;
}

/// Rewrites a query into a richer search text
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand(&self, query: &str) -> Result<String>;
}
