// src/server/spawner.rs

//! Spawns all of the server's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use crate::core::pubsub::channel_purger::ChannelPurgerTask;
use anyhow::{Result, anyhow};
use tracing::{debug, info};

/// Spawns the gateway, the pipeline workers and the maintenance tasks into the
/// context's JoinSet.
pub fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;
    let pending = ctx
        .pending
        .take()
        .ok_or_else(|| anyhow!("Background tasks have already been spawned"))?;

    // --- Metrics Server ---
    if ctx.config.metrics.enabled {
        let port = ctx.config.metrics.port;
        let shutdown_rx_metrics = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(port, shutdown_rx_metrics).await;
            Ok(())
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    // --- Gateway ---
    let gateway = pending.gateway;
    let shutdown_rx_gateway = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        gateway
            .run(pending.intake_rx, pending.results, shutdown_rx_gateway)
            .await;
        Ok(())
    });

    // --- Pipeline Workers ---
    for worker in pending.workers {
        debug!("Spawning worker for stage '{}'.", worker.stage_name());
        let shutdown_rx_worker = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            worker.run(shutdown_rx_worker).await;
            Ok(())
        });
    }

    // --- Maintenance Tasks ---
    let purger = ChannelPurgerTask::new(ctx.bus.clone());
    let shutdown_rx_purge = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        purger.run(shutdown_rx_purge).await;
        Ok(())
    });

    info!("All background tasks have been spawned.");
    Ok(())
}
