//! Prometheus metrics for reconciliation-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Counter for reconciliation runs by final status.
pub static RECONCILIATION_RUNS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_runs_total",
        "Total number of reconciliation runs",
        &["status"]
    )
    .expect("Failed to register RECONCILIATION_RUNS")
});

/// Counter for LLM calls by provider and outcome.
pub static LLM_CALLS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_llm_calls_total",
        "Total number of LLM classification calls",
        &["provider", "outcome"]
    )
    .expect("Failed to register LLM_CALLS")
});

/// Histogram for LLM call latency by provider.
pub static LLM_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "reconciliation_llm_call_duration_seconds",
        "LLM call duration in seconds",
        &["provider"],
        vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 80.0, 120.0]
    )
    .expect("Failed to register LLM_CALL_DURATION")
});

/// Counter for classifier batches by outcome.
pub static CLASSIFICATION_BATCHES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_classification_batches_total",
        "Total number of classification batches",
        &["outcome"]
    )
    .expect("Failed to register CLASSIFICATION_BATCHES")
});

/// Counter for persisted rows by outcome.
pub static PERSISTED_ROWS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_persisted_rows_total",
        "Total number of transaction rows by persistence outcome",
        &["outcome"]
    )
    .expect("Failed to register PERSISTED_ROWS")
});

/// Histogram for database query duration.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "reconciliation_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&RECONCILIATION_RUNS);
    Lazy::force(&LLM_CALLS);
    Lazy::force(&LLM_CALL_DURATION);
    Lazy::force(&CLASSIFICATION_BATCHES);
    Lazy::force(&PERSISTED_ROWS);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record the final status of a run.
pub fn record_run(status: &str) {
    RECONCILIATION_RUNS.with_label_values(&[status]).inc();
}

/// Record an LLM call and its latency.
pub fn record_llm_call(provider: &str, outcome: &str, duration_secs: f64) {
    LLM_CALLS.with_label_values(&[provider, outcome]).inc();
    LLM_CALL_DURATION
        .with_label_values(&[provider])
        .observe(duration_secs);
}

/// Record a classified batch.
pub fn record_batch(outcome: &str) {
    CLASSIFICATION_BATCHES.with_label_values(&[outcome]).inc();
}

/// Record persisted row outcomes.
pub fn record_rows(outcome: &str, count: usize) {
    PERSISTED_ROWS
        .with_label_values(&[outcome])
        .inc_by(count as f64);
}
