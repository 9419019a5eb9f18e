//! In-process query and click-through counters

use super::models::{ClickThroughEvent, PopularSearch};
use crate::cache::keys::normalize_query;
use moka::sync::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DEFAULT_CAPACITY: u64 = 10_000;
const DEFAULT_TIME_TO_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

/// Counts normalized queries and result clicks.
///
/// Both tables are bounded; rarely seen keys are evicted once a table is
/// full and any key untouched for the idle period is dropped.
pub struct SearchAnalytics {
    queries: Cache<String, Arc<AtomicU64>>,
    clicks: Cache<String, Arc<AtomicU64>>,
    total_clicks: AtomicU64,
}

impl Default for SearchAnalytics {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, DEFAULT_TIME_TO_IDLE)
    }
}

fn counter_table(capacity: u64, time_to_idle: Duration) -> Cache<String, Arc<AtomicU64>> {
    Cache::builder()
        .max_capacity(capacity)
        .time_to_idle(time_to_idle)
        .build()
}

fn bump(table: &Cache<String, Arc<AtomicU64>>, key: String) {
    table
        .get_with(key, || Arc::new(AtomicU64::new(0)))
        .fetch_add(1, Ordering::Relaxed);
}

impl SearchAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` distinct queries and as many clicked results
    pub fn with_capacity(capacity: u64, time_to_idle: Duration) -> Self {
        Self {
            queries: counter_table(capacity, time_to_idle),
            clicks: counter_table(capacity, time_to_idle),
            total_clicks: AtomicU64::new(0),
        }
    }

    pub fn record_query(&self, query: &str) {
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return;
        }
        bump(&self.queries, normalized);
    }

    /// Most frequent queries, ties broken alphabetically
    pub fn top_queries(&self, limit: usize) -> Vec<PopularSearch> {
        let mut popular: Vec<PopularSearch> = self
            .queries
            .iter()
            .map(|(query, count)| PopularSearch {
                query: query.as_ref().clone(),
                count: count.load(Ordering::Relaxed),
            })
            .collect();

        popular.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.query.cmp(&b.query)));
        popular.truncate(limit);
        popular
    }

    /// Distinct queries and clicked results currently tracked
    pub fn tracked_entries(&self) -> (u64, u64) {
        self.queries.run_pending_tasks();
        self.clicks.run_pending_tasks();
        (self.queries.entry_count(), self.clicks.entry_count())
    }

    pub fn record_click(&self, event: &ClickThroughEvent) {
        bump(&self.clicks, event.result_id.clone());
        self.total_clicks.fetch_add(1, Ordering::Relaxed);

        info!(
            search_id = %event.search_id,
            result_id = %event.result_id,
            position = event.position,
            "Click-through recorded"
        );
    }

    pub fn click_count(&self, result_id: &str) -> u64 {
        self.clicks
            .get(result_id)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn total_clicks(&self) -> u64 {
        self.total_clicks.load(Ordering::Relaxed)
    }
}
