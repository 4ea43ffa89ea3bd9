// src/core/metrics.rs

//! Defines and registers Prometheus metrics for gateway monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, Histogram, TextEncoder, register_counter,
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
};

lazy_static! {
    // --- Connection Gauges and Counters ---
    /// The number of clients currently connected to the gateway.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("primegate_connected_clients", "Number of currently connected clients.").unwrap();
    /// The total number of connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("primegate_connections_received_total", "Total number of connections received.").unwrap();


    // --- Request Counters ---
    /// The total number of requests handed to the pipeline.
    pub static ref REQUESTS_DISPATCHED_TOTAL: Counter =
        register_counter!("primegate_requests_dispatched_total", "Total number of requests dispatched to the pipeline.").unwrap();
    /// Responses written to clients, labeled by HTTP status code.
    pub static ref RESPONSES_TOTAL: CounterVec =
        register_counter_vec!("primegate_responses_total", "Total number of responses written, labeled by status.", &["status"]).unwrap();
    /// Requests rejected before reaching the pipeline, labeled by reason.
    pub static ref MALFORMED_REQUESTS_TOTAL: CounterVec =
        register_counter_vec!("primegate_malformed_requests_total", "Total number of malformed requests, labeled by reason.", &["reason"]).unwrap();
    /// Enqueue attempts rejected because a work queue was at its bound.
    pub static ref QUEUE_FULL_TOTAL: CounterVec =
        register_counter_vec!("primegate_queue_full_total", "Total number of enqueue attempts rejected by a full queue.", &["queue"]).unwrap();
    /// Completion events that no longer had a waiting connection.
    pub static ref ORPHAN_EVENTS_TOTAL: Counter =
        register_counter!("primegate_orphan_events_total", "Total number of completion events with no waiting connection.").unwrap();


    // --- Pipeline Metrics ---
    /// Units processed by each stage, labeled by stage and outcome.
    pub static ref STAGE_OUTCOMES_TOTAL: CounterVec =
        register_counter_vec!("primegate_stage_outcomes_total", "Total number of units processed, labeled by stage and outcome.", &["stage", "outcome"]).unwrap();
    /// Units currently waiting in each work queue.
    pub static ref WORK_QUEUE_DEPTH: GaugeVec =
        register_gauge_vec!("primegate_work_queue_depth", "Number of units waiting in a work queue.", &["queue"]).unwrap();


    // --- Histograms ---
    /// Time from dispatch to response for requests that went through the pipeline.
    pub static ref REQUEST_LATENCY_SECONDS: Histogram =
        register_histogram!("primegate_request_latency_seconds", "Latency from dispatch to response in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# failed to encode metrics: {e}\n"))
}
