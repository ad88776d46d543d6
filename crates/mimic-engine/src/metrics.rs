//! Prometheus metrics for the mock serving engine.
//!
//! Tracks served requests, resolver faults, live-log traffic and whether the
//! mock server is running.
use hyper::{Method, StatusCode};
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, register_int_gauge, Counter,
    CounterVec, Encoder, HistogramVec, IntGauge, TextEncoder,
};
use std::time::Duration;
use tracing::error;

lazy_static! {
    /// Total number of requests served by the mock listener
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "mimic_requests_total",
        "Total number of requests served by the mock server",
        &["method", "status"]
    )
    .unwrap();

    /// Request handling duration in milliseconds
    pub static ref REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "mimic_request_duration_ms",
        "Histogram of mock request handling time in milliseconds",
        &["method"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap();

    /// Resolver failures answered with 500
    pub static ref RESOLVER_FAULTS_TOTAL: Counter = register_counter!(
        "mimic_resolver_faults_total",
        "Total number of mock resolution failures"
    )
    .unwrap();

    /// Live-log events broadcast
    pub static ref LIVE_LOG_EVENTS_TOTAL: CounterVec = register_counter_vec!(
        "mimic_live_log_events_total",
        "Total number of live traffic log events broadcast",
        &["direction"]  // inbound|outbound
    )
    .unwrap();

    /// 1 while the mock server is running
    pub static ref SERVER_RUNNING: IntGauge = register_int_gauge!(
        "mimic_server_running",
        "Whether the mock server is running"
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_request(method: &Method, status: StatusCode, elapsed: Duration) {
    REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), status.as_str()])
        .inc();
    REQUEST_DURATION_MS
        .with_label_values(&[method.as_str()])
        .observe(elapsed.as_secs_f64() * 1000.0);
}

pub fn record_resolver_fault() {
    RESOLVER_FAULTS_TOTAL.inc();
}

pub fn record_live_log_event(direction: &str) {
    LIVE_LOG_EVENTS_TOTAL.with_label_values(&[direction]).inc();
}

pub fn set_server_running(running: bool) {
    SERVER_RUNNING.set(i64::from(running));
}
