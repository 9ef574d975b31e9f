use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, HistogramVec, register_counter, register_counter_vec, register_histogram_vec};


lazy_static! {
    pub static ref REQUEST_TOTAL: CounterVec = register_counter_vec!(
        "woundcare_ai_requests_total",
        "Total number of AI requests",
        &["endpoint"]
    )
    .unwrap();
    pub static ref REQUEST_LATENCY: HistogramVec = register_histogram_vec!(
        "woundcare_ai_request_latency_seconds",
        "AI request latency in seconds",
        &["endpoint"]
    )
    .unwrap();
    pub static ref RATE_LIMIT_REJECTED: Counter =
        register_counter!("woundcare_rate_limit_rejected_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref RATE_LIMIT_FAIL_OPEN: Counter =
        register_counter!("woundcare_rate_limit_fail_open_total", "Requests let through after a rate limit store error").unwrap();
    pub static ref RATE_LIMIT_REAPED: Counter =
        register_counter!("woundcare_rate_limit_reaped_total", "Stale rate limit records deleted").unwrap();
    pub static ref UPSTREAM_RETRIES: Counter =
        register_counter!("woundcare_upstream_retries_total", "Upstream attempts retried after a transient failure").unwrap();
    pub static ref UPSTREAM_FAILURES: CounterVec = register_counter_vec!(
        "woundcare_upstream_failures_total",
        "Upstream calls that failed for good, by failure kind",
        &["kind"]
    )
    .unwrap();
}
