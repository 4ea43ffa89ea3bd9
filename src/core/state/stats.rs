// src/core/state/stats.rs

//! Contains counters describing the gateway's activity.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters shared between the gateway task and the server's connection loop.
#[derive(Debug, Default)]
pub struct GatewayStats {
    /// The total number of connections registered with the gateway since startup.
    total_connections: AtomicU64,
    /// The total number of requests handed to the pipeline.
    requests_dispatched: AtomicU64,
    /// The total number of responses written.
    responses_sent: AtomicU64,
    /// The total number of completion events that found no waiting connection.
    orphan_events: AtomicU64,
    /// Connections currently open.
    open_connections: AtomicUsize,
    /// Requests dispatched but not yet answered.
    in_flight: AtomicUsize,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_total_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    pub fn increment_requests_dispatched(&self) {
        self.requests_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_requests_dispatched(&self) -> u64 {
        self.requests_dispatched.load(Ordering::Relaxed)
    }

    pub fn increment_responses_sent(&self) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_responses_sent(&self) -> u64 {
        self.responses_sent.load(Ordering::Relaxed)
    }

    pub fn increment_orphan_events(&self) {
        self.orphan_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_orphan_events(&self) -> u64 {
        self.orphan_events.load(Ordering::Relaxed)
    }

    /// Publishes the current table occupancy.
    pub fn set_occupancy(&self, open: usize, in_flight: usize) {
        self.open_connections.store(open, Ordering::Release);
        self.in_flight.store(in_flight, Ordering::Release);
    }

    pub fn get_open_connections(&self) -> usize {
        self.open_connections.load(Ordering::Acquire)
    }

    pub fn get_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}
