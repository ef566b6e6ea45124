//! Prometheus metrics for contract-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec, TextEncoder,
};

/// HTTP request counter by method, matched route and status.
pub static HTTP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "contract_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("Failed to register http_requests_total")
});

/// HTTP request duration histogram by method and matched route.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "contract_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register http_request_duration")
});

/// Engine operations by outcome (ok or the error code).
pub static OPERATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "contract_operations_total",
        "Total number of contract lifecycle operations",
        &["operation", "outcome"]
    )
    .expect("Failed to register operations_total")
});

/// Best-effort cleanup steps that failed after a committed transition.
pub static CLEANUP_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "contract_cleanup_failures_total",
        "Total number of failed cleanup steps",
        &["step"]
    )
    .expect("Failed to register cleanup_failures_total")
});

pub static NOTIFICATION_FAILURES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "contract_notification_failures_total",
        "Total number of notifications that could not be dispatched"
    )
    .expect("Failed to register notification_failures_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "contract_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&HTTP_REQUESTS_TOTAL);
    Lazy::force(&HTTP_REQUEST_DURATION);
    Lazy::force(&OPERATIONS_TOTAL);
    Lazy::force(&CLEANUP_FAILURES_TOTAL);
    Lazy::force(&NOTIFICATION_FAILURES_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Count an engine operation under its outcome label.
pub fn record_operation<T>(operation: &str, result: &crate::error::Result<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
