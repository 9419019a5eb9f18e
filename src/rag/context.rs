//! Token-budgeted context selection

use super::{RagContext, TokenEstimator};
use tracing::debug;

/// Contexts chosen for one generation call
#[derive(Debug, Clone, Default)]
pub struct ContextSelection {
    pub contexts: Vec<RagContext>,
    pub total_tokens: usize,
}

/// Greedily pick contexts in descending relevance.
///
/// Selection stops before the running estimate would exceed `max_tokens`
/// and in any case after `limit` contexts. The most relevant context is
/// always taken, even when it alone exceeds the budget.
pub fn select_contexts(
    mut candidates: Vec<RagContext>,
    limit: usize,
    max_tokens: usize,
    estimator: &TokenEstimator,
) -> ContextSelection {
    candidates.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

    let mut selection = ContextSelection::default();

    for candidate in candidates {
        if selection.contexts.len() >= limit {
            break;
        }

        let tokens = estimator.estimate(&candidate.text);
        if !selection.contexts.is_empty() && selection.total_tokens + tokens > max_tokens {
            debug!(
                "Token budget reached: {} + {} > {}",
                selection.total_tokens, tokens, max_tokens
            );
            break;
        }

        selection.total_tokens += tokens;
        selection.contexts.push(candidate);
    }

    selection
}
