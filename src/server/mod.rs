// src/server/mod.rs

use crate::config::Config;
use crate::core::state::GatewayStats;
use anyhow::{Context, Result, anyhow};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod spawner;

/// A running server started with [`start`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    stats: Arc<GatewayStats>,
    stop_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl ServerHandle {
    /// The address the server is accepting connections on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &Arc<GatewayStats> {
        &self.stats
    }

    /// Stops accepting connections, drains in-flight requests and waits for the
    /// server to finish shutting down.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        self.join
            .await
            .map_err(|e| anyhow!("Server task failed during shutdown: {e:?}"))
    }
}

/// Starts the server in the background and returns once it is accepting connections.
pub async fn start(config: Config) -> Result<ServerHandle> {
    let mut server_context = initialization::setup(config).await?;
    spawner::spawn_all(&mut server_context)?;

    let local_addr = server_context.listener.local_addr()?;
    let stats = server_context.stats.clone();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let join = tokio::spawn(connection_loop::run(server_context, async move {
        let _ = stop_rx.await;
    }));

    Ok(ServerHandle {
        local_addr,
        stats,
        stop_tx: Some(stop_tx),
        join,
    })
}

/// The main server startup function. Runs until SIGINT or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    // 1. Bind the listener and build the gateway and pipeline.
    let mut server_context = initialization::setup(config).await?;

    // 2. Spawn the gateway, the workers and the maintenance tasks.
    spawner::spawn_all(&mut server_context)?;

    // 3. Accept connections until a signal arrives.
    connection_loop::run(server_context, async move {
        tokio::select! {
            _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
            _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
        }
    })
    .await;

    Ok(())
}
