// src/server/context.rs

use crate::config::Config;
use crate::core::gateway::{Gateway, TransportEvent};
use crate::core::pipeline::StageWorker;
use crate::core::pubsub::{CompletionBus, CompletionSubscription};
use crate::core::state::GatewayStats;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinSet;

/// The gateway and pipeline workers, built but not yet running.
pub struct PendingTasks {
    pub gateway: Gateway,
    pub intake_rx: mpsc::UnboundedReceiver<TransportEvent>,
    pub results: CompletionSubscription,
    pub workers: Vec<StageWorker>,
}

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub config: Config,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    pub connection_permits: Arc<Semaphore>,
    pub intake_tx: mpsc::UnboundedSender<TransportEvent>,
    pub stats: Arc<GatewayStats>,
    pub bus: Arc<CompletionBus>,
    pub pending: Option<PendingTasks>,
}
