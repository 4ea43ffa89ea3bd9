// src/connection/handler.rs

//! Defines the `ConnectionHandler`, which owns one client socket for its lifetime.

use super::guard::ConnectionGuard;
use super::writer::{ConnectionWriter, Outbound};
use crate::core::GatewayError;
use crate::core::gateway::TransportEvent;
use crate::core::identity::ConnectionIdentity;
use crate::core::protocol::HttpResponseCodec;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{BytesCodec, FramedRead, FramedWrite};
use tracing::{debug, info, warn};

/// Relays a socket's bytes to the gateway as transport events and applies the
/// writes the gateway queues for it. Holds no request state of its own.
pub struct ConnectionHandler {
    socket: TcpStream,
    addr: SocketAddr,
    identity: ConnectionIdentity,
    intake: mpsc::UnboundedSender<TransportEvent>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionHandler {
    pub fn new(
        socket: TcpStream,
        addr: SocketAddr,
        identity: ConnectionIdentity,
        intake: mpsc::UnboundedSender<TransportEvent>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            socket,
            addr,
            identity,
            intake,
            shutdown_rx,
        }
    }

    /// The main loop for the connection. Returns once the gateway closes the
    /// connection, the peer goes away, or the server shuts down.
    pub async fn run(mut self) -> Result<(), GatewayError> {
        let (writer, mut outbound) = ConnectionWriter::channel();
        let _guard = ConnectionGuard::new(self.identity.clone(), self.intake.clone(), self.addr);
        self.intake
            .send(TransportEvent::Connected {
                identity: self.identity.clone(),
                writer,
            })
            .map_err(|_| GatewayError::ChannelClosed("gateway intake"))?;

        let (read_half, write_half) = self.socket.into_split();
        let mut reader = FramedRead::new(read_half, BytesCodec::new());
        let mut sink = FramedWrite::new(write_half, HttpResponseCodec);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Connection handler for {} received shutdown signal.", self.addr);
                    break;
                }
                maybe_outbound = outbound.recv() => {
                    match maybe_outbound {
                        Some(Outbound::Response(response)) => {
                            sink.send(response).await?;
                        }
                        Some(Outbound::Close) | None => {
                            if let Err(e) = sink.close().await {
                                debug!("Error closing connection {}: {}", self.addr, e);
                            }
                            break;
                        }
                    }
                }
                result = reader.next() => {
                    match result {
                        Some(Ok(chunk)) => {
                            let event = TransportEvent::Data {
                                identity: self.identity.clone(),
                                chunk: chunk.freeze(),
                            };
                            if self.intake.send(event).is_err() {
                                warn!("Gateway intake closed, dropping connection {}.", self.addr);
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            if is_normal_disconnect(&e) {
                                debug!("Connection from {} closed by peer: {}", self.addr, e);
                            } else {
                                warn!("Connection error for {}: {}", self.addr, e);
                            }
                            break;
                        }
                        None => {
                            debug!("Connection from {} closed by peer.", self.addr);
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Checks if an I/O error represents a normal client disconnection.
fn is_normal_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::UnexpectedEof
    )
}
