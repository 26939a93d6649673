// src/metrics/mod.rs
// Prometheus metrics for the query-processing core

use axum::{http::StatusCode, response::IntoResponse};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::info;

/// Global Prometheus handle for metrics rendering
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics exporter
pub fn init_metrics() {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    PROMETHEUS_HANDLE
        .set(handle)
        .expect("Prometheus handle already initialized");

    info!("Prometheus metrics initialized");
}

/// GET /metrics - Prometheus metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Record a cache lookup per namespace
pub fn record_cache_result(namespace: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("askdb_cache_total", "namespace" => namespace.to_string(), "result" => result)
        .increment(1);
}

/// Record an LM API call
pub fn record_llm_call(model: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!("askdb_llm_calls_total", "model" => model.to_string(), "status" => status)
        .increment(1);
}

/// Record a transient-failure retry inside the LM client
pub fn record_llm_retry() {
    counter!("askdb_llm_retries_total").increment(1);
}

/// Record a job reaching a terminal state
pub fn record_job_terminal(pool: &str, state: &str) {
    counter!("askdb_jobs_total", "pool" => pool.to_string(), "state" => state.to_string())
        .increment(1);
}

/// Record end-to-end job duration (histogram)
pub fn record_job_duration(pool: &str, duration_seconds: f64) {
    histogram!("askdb_job_duration_seconds", "pool" => pool.to_string())
        .record(duration_seconds);
}

/// Record a submit rejected by back-pressure
pub fn record_overload(pool: &str) {
    counter!("askdb_submit_rejected_total", "pool" => pool.to_string()).increment(1);
}

/// Record a transient-failure job re-enqueue
pub fn record_job_retry(pool: &str) {
    counter!("askdb_job_retries_total", "pool" => pool.to_string()).increment(1);
}

/// Track queue depth per pool
pub fn set_queue_depth(pool: &str, depth: usize) {
    gauge!("askdb_queue_depth", "pool" => pool.to_string()).set(depth as f64);
}

/// Record a correction-graph outcome
pub fn record_correction(succeeded: bool) {
    let outcome = if succeeded { "fixed" } else { "gave_up" };
    counter!("askdb_corrections_total", "outcome" => outcome).increment(1);
}

/// Record a scheduler tick per task
pub fn record_scheduled_task(task: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!("askdb_scheduled_tasks_total", "task" => task.to_string(), "status" => status)
        .increment(1);
}
