// src/core/dispatcher.rs

use crate::core::GatewayError;
use crate::core::assembler::RawRequest;
use crate::core::events::{Route, WorkUnit};
use crate::core::identity::ConnectionIdentity;
use crate::core::metrics::REQUESTS_DISPATCHED_TOTAL;
use crate::core::queue::WorkQueue;
use tracing::debug;

/// Turns complete requests into work units on the pipeline's entry queue.
#[derive(Debug, Clone)]
pub struct WorkDispatcher {
    queue: WorkQueue,
    default_route: Route,
}

impl WorkDispatcher {
    pub fn new(queue: WorkQueue) -> Self {
        Self {
            queue,
            default_route: Route::broadcast(),
        }
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.default_route = route;
        self
    }

    /// Enqueues exactly one work unit for `request`. Never waits.
    pub fn dispatch(
        &self,
        identity: ConnectionIdentity,
        request: RawRequest,
    ) -> Result<(), GatewayError> {
        let unit = WorkUnit {
            identity,
            route: self.default_route.clone(),
            payload: request.into_bytes(),
        };
        debug!(
            "Dispatching {} bytes for {} to '{}'",
            unit.payload.len(),
            unit.identity,
            self.queue.name()
        );
        self.queue.enqueue(unit)?;
        REQUESTS_DISPATCHED_TOTAL.inc();
        Ok(())
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }
}
