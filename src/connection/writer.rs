// src/connection/writer.rs

//! The gateway's handle for writing to a connection without touching its socket.

use crate::core::protocol::HttpResponse;
use tokio::sync::mpsc;

/// An instruction for a connection's socket task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Response(HttpResponse),
    Close,
}

/// Queues responses and close signals for one connection. Never waits.
#[derive(Debug, Clone)]
pub struct ConnectionWriter {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionWriter {
    /// Creates a writer and the receiver the socket task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues a response. Returns false if the socket task is already gone.
    pub fn write(&self, response: HttpResponse) -> bool {
        self.tx.send(Outbound::Response(response)).is_ok()
    }

    /// Asks the socket task to flush and close the connection.
    pub fn close(&self) -> bool {
        self.tx.send(Outbound::Close).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
