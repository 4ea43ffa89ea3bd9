// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::gateway::TransportEvent;
use crate::core::identity::ConnectionIdentity;
use crate::core::metrics;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::debug;

/// An RAII guard that tells the gateway a connection is gone when the
/// connection's socket task exits, however it exits.
pub struct ConnectionGuard {
    identity: ConnectionIdentity,
    intake: mpsc::UnboundedSender<TransportEvent>,
    addr: SocketAddr,
}

impl ConnectionGuard {
    pub(crate) fn new(
        identity: ConnectionIdentity,
        intake: mpsc::UnboundedSender<TransportEvent>,
        addr: SocketAddr,
    ) -> Self {
        metrics::CONNECTED_CLIENTS.inc();
        Self {
            identity,
            intake,
            addr,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::CONNECTED_CLIENTS.dec();
        debug!(
            "ConnectionGuard dropping, releasing connection {} from {}",
            self.identity, self.addr
        );

        let event = TransportEvent::Disconnected {
            identity: self.identity.clone(),
        };
        if self.intake.send(event).is_err() {
            debug!(
                "Gateway already stopped when {} disconnected.",
                self.identity
            );
        }
    }
}
