//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions for the ingestion, resolution,
//! graph, and orchestrator pipelines.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all crate metrics
pub const METRICS_PREFIX: &str = "paperforge";

/// SLO-aligned histogram buckets for orchestrator stage latency (in seconds).
/// Per-stage timeout is 15s, overall deadline 30s.
pub const STAGE_LATENCY_BUCKETS: &[f64] = &[
    0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 15.00, 30.00,
];

/// Buckets for embedding and LLM call latency (typically slower, network-bound).
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 10.00, 30.00,
];

/// Buckets for per-paper ingestion latency.
pub const INGESTION_BUCKETS: &[f64] = &[
    0.100, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00, 60.00, 120.0,
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Ingestion metrics
    describe_counter!(
        format!("{}_papers_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Total papers ingested"
    );

    describe_counter!(
        format!("{}_papers_failed_total", METRICS_PREFIX),
        Unit::Count,
        "Total papers that failed extraction"
    );

    describe_counter!(
        format!("{}_chunks_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks created"
    );

    describe_histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Per-paper ingestion latency in seconds"
    );

    describe_gauge!(
        format!("{}_job_progress_ratio", METRICS_PREFIX),
        Unit::Count,
        "Ingest job progress in [0, 1]"
    );

    // Entity resolution metrics
    describe_counter!(
        format!("{}_resolution_candidates_total", METRICS_PREFIX),
        Unit::Count,
        "Total candidate pairs considered for merge"
    );

    describe_counter!(
        format!("{}_resolution_merges_total", METRICS_PREFIX),
        Unit::Count,
        "Total entity merges performed, by deciding stage"
    );

    describe_counter!(
        format!("{}_resolution_llm_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Total LLM confirmation calls made during resolution"
    );

    describe_histogram!(
        format!("{}_resolution_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Resolution pass latency in seconds"
    );

    // Graph store / retrieval metrics
    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval query latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of results returned from a retrieval query"
    );

    describe_counter!(
        format!("{}_gaps_detected_total", METRICS_PREFIX),
        Unit::Count,
        "Total structural gaps detected"
    );

    describe_histogram!(
        format!("{}_clustering_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Clustering + centrality recompute latency in seconds"
    );

    // Orchestrator metrics
    describe_histogram!(
        format!("{}_orchestrator_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Per-stage orchestrator latency in seconds"
    );

    describe_counter!(
        format!("{}_orchestrator_stage_timeouts_total", METRICS_PREFIX),
        Unit::Count,
        "Total orchestrator stage timeouts"
    );

    describe_counter!(
        format!("{}_orchestrator_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total natural-language queries answered"
    );

    // Embedding / LLM provider metrics
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
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total LLM provider requests, by provider and outcome"
    );

    // Database metrics
    describe_gauge!(
        format!("{}_db_connections_active", METRICS_PREFIX),
        Unit::Count,
        "Active database connections"
    );

    describe_histogram!(
        format!("{}_db_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Database query latency in seconds"
    );

    // Cache metrics
    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record orchestrator stage metrics
pub struct StageMetrics {
    start: Instant,
    stage: String,
}

impl StageMetrics {
    pub fn start(stage: &str) -> Self {
        Self {
            start: Instant::now(),
            stage: stage.to_string(),
        }
    }

    /// Record stage completion. `timed_out` marks whether the per-stage
    /// deadline was hit and a partial/fallback result was used instead.
    pub fn finish(self, timed_out: bool) {
        let duration = self.start.elapsed().as_secs_f64();

        histogram!(
            format!("{}_orchestrator_stage_duration_seconds", METRICS_PREFIX),
            "stage" => self.stage.clone()
        )
        .record(duration);

        if timed_out {
            counter!(
                format!("{}_orchestrator_stage_timeouts_total", METRICS_PREFIX),
                "stage" => self.stage
            )
            .increment(1);
        }
    }
}

/// Helper to record a completed orchestrator query
pub fn record_query() {
    counter!(format!("{}_orchestrator_queries_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record retrieval metrics
pub fn record_retrieval(duration_secs: f64, mode: &str, result_count: usize) {
    histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .set(result_count as f64);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
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
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record LLM provider outcomes
pub fn record_llm_call(provider: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    if hit {
        counter!(
            format!("{}_cache_hits_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_cache_misses_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    }
}

/// Helper to record per-paper ingestion metrics
pub fn record_ingestion(duration_secs: f64, chunks_created: usize, project_id: &str) {
    counter!(
        format!("{}_papers_ingested_total", METRICS_PREFIX),
        "project" => project_id.to_string()
    )
    .increment(1);

    counter!(
        format!("{}_chunks_created_total", METRICS_PREFIX),
        "project" => project_id.to_string()
    )
    .increment(chunks_created as u64);

    histogram!(format!("{}_ingestion_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to record resolution pass outcomes
pub fn record_resolution(duration_secs: f64, candidates: usize, merges: usize, llm_calls: usize) {
    counter!(format!("{}_resolution_candidates_total", METRICS_PREFIX)).increment(candidates as u64);
    counter!(format!("{}_resolution_merges_total", METRICS_PREFIX)).increment(merges as u64);
    counter!(format!("{}_resolution_llm_calls_total", METRICS_PREFIX)).increment(llm_calls as u64);
    histogram!(format!("{}_resolution_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to record gap-detection outcomes
pub fn record_gaps_detected(duration_secs: f64, gap_count: usize) {
    counter!(format!("{}_gaps_detected_total", METRICS_PREFIX)).increment(gap_count as u64);
    histogram!(format!("{}_clustering_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_latency_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in STAGE_LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
        assert!(STAGE_LATENCY_BUCKETS.contains(&15.00));
        assert!(STAGE_LATENCY_BUCKETS.contains(&30.00));
    }

    #[test]
    fn test_stage_metrics_runs() {
        let metrics = StageMetrics::start("intent_parse");
        std::thread::sleep(std::time::Duration::from_millis(5));
        metrics.finish(false);
    }
}
