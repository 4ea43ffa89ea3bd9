// src/server/connection_loop.rs

//! Contains the main server loop for accepting connections and handling graceful shutdown.

use super::context::ServerContext;
use crate::connection::ConnectionHandler;
use crate::core::identity::IdentityMinter;
use crate::core::metrics;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// How often the drain phase checks for outstanding requests.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// The main server loop. Accepts connections until `stop` resolves or a critical
/// background task fails, then drains in-flight requests and shuts down.
pub async fn run(mut ctx: ServerContext, stop: impl Future<Output = ()>) {
    let mut minter = IdentityMinter::new();
    let mut client_tasks = JoinSet::new();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            biased;

            _ = &mut stop => {
                info!("Stop requested, initiating graceful shutdown.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = ctx.listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        let Ok(permit) = ctx.connection_permits.clone().try_acquire_owned() else {
                            warn!("Rejecting connection from {}: max_clients reached.", addr);
                            continue;
                        };
                        metrics::CONNECTIONS_RECEIVED_TOTAL.inc();

                        let identity = minter.mint();
                        debug!("Accepted new connection from {} as {}", addr, identity);
                        let handler = ConnectionHandler::new(
                            socket,
                            addr,
                            identity,
                            ctx.intake_tx.clone(),
                            ctx.shutdown_tx.subscribe(),
                        );
                        client_tasks.spawn(async move {
                            let _permit = permit;
                            if let Err(e) = handler.run().await {
                                warn!("Connection from {} terminated unexpectedly: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A client handler panicked: {e:?}");
                }
            },
        }
    }

    // Stop accepting before draining so no new work arrives.
    drop(ctx.listener);

    let drain_timeout = ctx.config.shutdown.drain_timeout;
    let in_flight = ctx.stats.get_in_flight();
    if in_flight > 0 {
        info!(
            "Waiting up to {:?} for {} in-flight requests.",
            drain_timeout, in_flight
        );
        let stats = ctx.stats.clone();
        if tokio::time::timeout(drain_timeout, async move {
            while stats.get_in_flight() > 0 {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await
        .is_err()
        {
            warn!(
                "Timed out draining; {} requests still in flight.",
                ctx.stats.get_in_flight()
            );
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
    }

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(ctx.config.shutdown.shutdown_timeout, async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
        ctx.background_tasks.shutdown().await;
    }

    client_tasks.shutdown().await;
    info!("All client connections closed.");
    info!("Server shutdown complete.");
}
