// src/core/pubsub/channel_purger.rs

//! A background task to periodically clean up closed completion subscribers.

use super::CompletionBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

/// The default interval at which the purger task runs.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// The background task struct for the subscriber purger.
pub struct ChannelPurgerTask {
    bus: Arc<CompletionBus>,
    interval: Duration,
}

impl ChannelPurgerTask {
    pub fn new(bus: Arc<CompletionBus>) -> Self {
        Self {
            bus,
            interval: PURGE_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The main run loop for the purger task.
    /// It periodically calls `purge_closed` on the `CompletionBus`.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Completion bus purger task started.");
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.bus.purge_closed();
                }
                _ = shutdown_rx.recv() => {
                    info!("Completion bus purger task shutting down.");
                    return;
                }
            }
        }
    }
}
