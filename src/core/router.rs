// src/core/router.rs

//! Correlates completion events with the connections waiting for them.

use crate::core::GatewayError;
use crate::core::events::{CompletionEvent, Topic};
use crate::core::metrics::{ORPHAN_EVENTS_TOTAL, REQUEST_LATENCY_SECONDS, RESPONSES_TOTAL};
use crate::core::protocol::{HttpResponse, StatusCode};
use crate::core::state::{ConnectionEntry, ConnectionState, ConnectionTable};
use std::time::Instant;
use tracing::{debug, warn};

/// The body sent with every response to an `Error` event.
pub const ERROR_BODY: &str = "The request could not be processed";

/// What happened to a completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteResult {
    Delivered(StatusCode),
    Orphaned,
}

/// Turns completion events into responses for the connections in a table.
#[derive(Debug, Default)]
pub struct ResultRouter {
    orphans: u64,
}

impl ResultRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to its connection if that connection is still waiting
    /// for it. Anything else is dropped as an orphan.
    pub fn on_event(&mut self, table: &mut ConnectionTable, event: CompletionEvent) -> RouteResult {
        match table.state_of(&event.identity) {
            Some(ConnectionState::RequestDispatched) => {}
            Some(state) => {
                warn!(
                    "Dropping {} event for {} in state {}",
                    event.topic, event.identity, state
                );
                return self.orphan();
            }
            None => {
                let e = GatewayError::OrphanCompletion(event.identity.to_string());
                debug!("Dropping {} event: {}", event.topic, e);
                return self.orphan();
            }
        }

        table.transition(&event.identity, ConnectionState::ResponseSent, Instant::now());
        let Some(entry) = table.remove(&event.identity) else {
            return self.orphan();
        };

        let response = match event.topic {
            Topic::Success => HttpResponse::ok(event.payload),
            Topic::Error => {
                debug!(
                    "Request {} failed: {}",
                    event.identity,
                    String::from_utf8_lossy(&event.payload)
                );
                HttpResponse::error(StatusCode::BadRequest, ERROR_BODY)
            }
        };
        RouteResult::Delivered(deliver(entry, response))
    }

    /// The number of events dropped so far.
    pub fn orphan_count(&self) -> u64 {
        self.orphans
    }

    fn orphan(&mut self) -> RouteResult {
        self.orphans += 1;
        ORPHAN_EVENTS_TOTAL.inc();
        RouteResult::Orphaned
    }
}

/// Writes `response` to a connection already removed from the table and closes it.
pub(crate) fn deliver(entry: ConnectionEntry, response: HttpResponse) -> StatusCode {
    let status = response.status;
    if let Some(dispatched_at) = entry.dispatched_at {
        REQUEST_LATENCY_SECONDS.observe(dispatched_at.elapsed().as_secs_f64());
    }
    RESPONSES_TOTAL
        .with_label_values(&[status.to_string().as_str()])
        .inc();
    debug!("Responding {} to {}", status, entry.identity);
    if !entry.writer.write(response) || !entry.writer.close() {
        debug!("Connection {} went away before its response", entry.identity);
    }
    status
}
