// src/server/initialization.rs

//! Builds every component the server needs before its main loop starts: the
//! listener, the completion and interrupt buses, the pipeline and the gateway.

use super::context::{PendingTasks, ServerContext};
use crate::config::Config;
use crate::core::dispatcher::WorkDispatcher;
use crate::core::events::Topic;
use crate::core::gateway::{Gateway, GatewaySettings};
use crate::core::pipeline::Pipeline;
use crate::core::pubsub::{CompletionBus, InterruptBus};
use crate::core::state::GatewayStats;
use anyhow::{Context, Result};
use bytes::Bytes;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let bus = Arc::new(CompletionBus::new());
    let interrupts = InterruptBus::new();
    let pipeline = Pipeline::from_config(&config.pipeline);
    let handles = pipeline.build(
        config.queue.depth,
        config.pipeline.workers_per_stage,
        bus.clone(),
        &interrupts,
    );
    info!(
        "Pipeline built with stages [{}] and {} workers.",
        pipeline.stage_names().join(" -> "),
        handles.workers.len()
    );

    let stats = Arc::new(GatewayStats::new());
    let results = bus.subscribe(&[Topic::Success, Topic::Error], Bytes::new());
    let gateway = Gateway::new(
        GatewaySettings::from(&config),
        WorkDispatcher::new(handles.entry),
        interrupts,
        stats.clone(),
    );
    let (intake_tx, intake_rx) = mpsc::unbounded_channel();

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    info!("primegate listening on {}", listener.local_addr()?);
    let connection_permits = Arc::new(Semaphore::new(config.max_clients));

    Ok(ServerContext {
        config,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        connection_permits,
        intake_tx,
        stats,
        bus,
        pending: Some(PendingTasks {
            gateway,
            intake_rx,
            results,
            workers: handles.workers,
        }),
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    match config.queue.depth {
        Some(depth) => info!("Work queues bounded at {} units.", depth),
        None => warn!("WARNING: No 'queue.depth' limit is active. Work queues are unbounded."),
    }
    info!(
        "Requests limited to {} bytes, assembled within {:?}, answered within {:?}.",
        config.limits.max_request_size,
        config.limits.assembly_timeout,
        config.limits.request_timeout
    );
    if let Some(path) = &config.health_check_path {
        info!("Health checks answered at '{}'.", path);
    }
}
