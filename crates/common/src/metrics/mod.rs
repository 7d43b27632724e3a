//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Toponym metrics
pub const METRICS_PREFIX: &str = "toponym";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 25ms, P99 < 250ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms - P50 target
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms - P99 target
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
];

/// Buckets for embedding latency (typically slower)
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Resolution metrics
    describe_counter!(
        format!("{}_resolutions_total", METRICS_PREFIX),
        Unit::Count,
        "Token resolutions by terminal status"
    );

    describe_histogram!(
        format!("{}_resolution_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Batch resolution latency in seconds"
    );

    describe_counter!(
        format!("{}_source_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Signal sources that failed or timed out and were treated as empty"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_cache_builds_total", METRICS_PREFIX),
        Unit::Count,
        "Embedding cache constructions"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record one token's terminal status
pub fn record_resolution(status: &str) {
    counter!(
        format!("{}_resolutions_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Helper to record a whole batch
pub fn record_batch(duration_secs: f64, token_count: usize) {
    histogram!(
        format!("{}_resolution_duration_seconds", METRICS_PREFIX),
        "tokens" => bucket_label(token_count)
    )
    .record(duration_secs);
}

/// Helper to record a degraded signal source
pub fn record_source_failure(source: &str) {
    counter!(
        format!("{}_source_failures_total", METRICS_PREFIX),
        "source" => source.to_string()
    )
    .increment(1);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string(),
            "batch" => bucket_label(batch_size)
        )
        .record(duration_secs);
    }
}

/// Helper to record an embedding cache construction
pub fn record_cache_build(entries: usize) {
    counter!(format!("{}_embedding_cache_builds_total", METRICS_PREFIX)).increment(1);
    tracing::debug!(entries, "Embedding cache build recorded");
}

/// Coarse label keeping histogram cardinality bounded
fn bucket_label(n: usize) -> String {
    match n {
        0..=1 => "1",
        2..=8 => "2-8",
        9..=32 => "9-32",
        _ => "33+",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        // Verify buckets are sorted and contain SLO targets
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }

        assert!(LATENCY_BUCKETS.contains(&0.025));
        assert!(LATENCY_BUCKETS.contains(&0.250));
    }

    #[test]
    fn test_bucket_labels() {
        assert_eq!(bucket_label(1), "1");
        assert_eq!(bucket_label(5), "2-8");
        assert_eq!(bucket_label(32), "9-32");
        assert_eq!(bucket_label(500), "33+");
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("POST", "/v1/resolve");
        metrics.finish(200);
        record_resolution("resolved");
        record_source_failure("gazetteer:city");
        // Just verify it runs without panic
    }
}
