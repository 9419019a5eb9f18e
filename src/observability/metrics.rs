//! Metrics collection and reporting

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Search metrics snapshot
#[derive(Debug, Clone)]
pub struct SearchMetrics {
    /// Searches served (including cache hits)
    pub total_searches: u64,

    /// Searches rejected with a validation error
    pub validation_errors: u64,

    /// Strategy executions that failed or timed out
    pub strategy_failures: u64,

    /// Cache hit rate across all cached data types
    pub cache_hit_rate: f64,

    /// Recorded click-through events
    pub click_throughs: u64,

    /// Average search time (ms)
    pub avg_search_time_ms: f64,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

/// Latency histogram buckets (in milliseconds)
const LATENCY_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0];

/// Histogram for tracking latency distribution
#[derive(Debug, Clone)]
pub struct Histogram {
    buckets: Vec<(f64, Arc<AtomicU64>)>,
    sum: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    fn new(buckets: &[f64]) -> Self {
        let bucket_counters = buckets
            .iter()
            .map(|&b| (b, Arc::new(AtomicU64::new(0))))
            .collect();

        Self {
            buckets: bucket_counters,
            sum: Arc::new(AtomicU64::new(0)),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    fn observe(&self, value: f64) {
        self.sum.fetch_add(value as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        // Cumulative: every bucket >= value is incremented
        for (bucket, counter) in &self.buckets {
            if value <= *bucket {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn export_prometheus(&self, name: &str, help: &str, labels: &str) -> String {
        let mut output = String::new();
        let separator = if labels.is_empty() { "" } else { "," };

        for (bucket, counter) in &self.buckets {
            let count = counter.load(Ordering::Relaxed);
            output.push_str(&format!(
                "{}_bucket{{{}{}le=\"{}\"}} {}\n",
                name, labels, separator, bucket, count
            ));
        }

        let total_count = self.count.load(Ordering::Relaxed);
        output.push_str(&format!(
            "{}_bucket{{{}{}le=\"+Inf\"}} {}\n",
            name, labels, separator, total_count
        ));

        let sum = self.sum.load(Ordering::Relaxed) as f64;
        let label_block = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels) };
        output.push_str(&format!("{}_sum{} {:.3}\n", name, label_block, sum));
        output.push_str(&format!("{}_count{} {}\n", name, label_block, total_count));

        if help.is_empty() {
            output
        } else {
            format!("# HELP {} {}\n# TYPE {} histogram\n{}", name, help, name, output)
        }
    }
}

/// Metrics collector
pub struct MetricsCollector {
    start_time: Instant,
    total_searches: AtomicU64,
    validation_errors: AtomicU64,
    strategy_failures: AtomicU64,
    total_search_time_ms: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    click_throughs: AtomicU64,
    fallbacks_served: AtomicU64,

    search_latency: Histogram,
    strategy_latency: DashMap<String, Histogram>,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_searches: AtomicU64::new(0),
            validation_errors: AtomicU64::new(0),
            strategy_failures: AtomicU64::new(0),
            total_search_time_ms: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            click_throughs: AtomicU64::new(0),
            fallbacks_served: AtomicU64::new(0),
            search_latency: Histogram::new(LATENCY_BUCKETS),
            strategy_latency: DashMap::new(),
        }
    }

    /// Record a completed search
    pub fn record_search(&self, duration: Duration) {
        self.total_searches.fetch_add(1, Ordering::Relaxed);
        let ms = duration.as_millis() as u64;
        self.total_search_time_ms.fetch_add(ms, Ordering::Relaxed);
        self.search_latency.observe(ms as f64);
    }

    /// Record one strategy's execution time
    pub fn record_strategy_latency(&self, strategy: &str, duration: Duration) {
        self.strategy_latency
            .entry(strategy.to_string())
            .or_insert_with(|| Histogram::new(LATENCY_BUCKETS))
            .observe(duration.as_millis() as f64);
    }

    /// Record a failed or timed-out strategy
    pub fn record_strategy_failure(&self) {
        self.strategy_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected query
    pub fn record_validation_error(&self) {
        self.validation_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a breaker fallback being served
    pub fn record_fallback(&self) {
        self.fallbacks_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Record cache hit
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record cache miss
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a click-through
    pub fn record_click_through(&self) {
        self.click_throughs.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics
    pub fn get_metrics(&self) -> SearchMetrics {
        let total_searches = self.total_searches.load(Ordering::Relaxed);
        let total_time = self.total_search_time_ms.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);

        let avg_search_time_ms = if total_searches > 0 {
            total_time as f64 / total_searches as f64
        } else {
            0.0
        };

        let cache_total = cache_hits + cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            cache_hits as f64 / cache_total as f64
        } else {
            0.0
        };

        SearchMetrics {
            total_searches,
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
            strategy_failures: self.strategy_failures.load(Ordering::Relaxed),
            cache_hit_rate,
            click_throughs: self.click_throughs.load(Ordering::Relaxed),
            avg_search_time_ms,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let metrics = self.get_metrics();
        let fallbacks = self.fallbacks_served.load(Ordering::Relaxed);

        let mut output = format!(
            "# HELP retrieval_searches_total Total number of searches served\n\
             # TYPE retrieval_searches_total counter\n\
             retrieval_searches_total {}\n\
             \n\
             # HELP retrieval_validation_errors_total Searches rejected by validation\n\
             # TYPE retrieval_validation_errors_total counter\n\
             retrieval_validation_errors_total {}\n\
             \n\
             # HELP retrieval_strategy_failures_total Failed or timed-out strategy executions\n\
             # TYPE retrieval_strategy_failures_total counter\n\
             retrieval_strategy_failures_total {}\n\
             \n\
             # HELP retrieval_fallbacks_total Circuit breaker fallbacks served\n\
             # TYPE retrieval_fallbacks_total counter\n\
             retrieval_fallbacks_total {}\n\
             \n\
             # HELP retrieval_cache_hit_rate Cache hit rate\n\
             # TYPE retrieval_cache_hit_rate gauge\n\
             retrieval_cache_hit_rate {:.4}\n\
             \n\
             # HELP retrieval_click_throughs_total Recorded click-through events\n\
             # TYPE retrieval_click_throughs_total counter\n\
             retrieval_click_throughs_total {}\n\
             \n\
             # HELP retrieval_avg_search_time_ms Average search time in milliseconds\n\
             # TYPE retrieval_avg_search_time_ms gauge\n\
             retrieval_avg_search_time_ms {:.2}\n\
             \n\
             # HELP retrieval_uptime_seconds Uptime in seconds\n\
             # TYPE retrieval_uptime_seconds counter\n\
             retrieval_uptime_seconds {}\n\
             \n",
            metrics.total_searches,
            metrics.validation_errors,
            metrics.strategy_failures,
            fallbacks,
            metrics.cache_hit_rate,
            metrics.click_throughs,
            metrics.avg_search_time_ms,
            metrics.uptime_secs,
        );

        output.push_str(&self.search_latency.export_prometheus(
            "retrieval_search_duration_ms",
            "Search duration in milliseconds",
            "",
        ));

        let mut strategies: Vec<_> = self
            .strategy_latency
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        strategies.sort_by(|a, b| a.0.cmp(&b.0));

        if !strategies.is_empty() {
            output.push('\n');
            output.push_str("# HELP retrieval_strategy_duration_ms Strategy duration in milliseconds\n");
            output.push_str("# TYPE retrieval_strategy_duration_ms histogram\n");
            for (strategy, histogram) in strategies {
                output.push_str(&histogram.export_prometheus(
                    "retrieval_strategy_duration_ms",
                    "",
                    &format!("strategy=\"{}\"", strategy),
                ));
            }
        }

        output
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
