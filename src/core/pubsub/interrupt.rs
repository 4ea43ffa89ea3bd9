// src/core/pubsub/interrupt.rs

//! Interrupts tell pipeline workers that a connection is gone, so work still
//! queued for it can be skipped instead of computed and orphaned.

use crate::core::identity::ConnectionIdentity;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;

/// The capacity of the interrupt broadcast channel.
const INTERRUPT_CHANNEL_CAPACITY: usize = 4096;

/// How long a listener remembers an interrupt.
pub const DEFAULT_INTERRUPT_RETENTION: Duration = Duration::from_secs(300);

/// The publishing side of the interrupt channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InterruptBus {
    tx: broadcast::Sender<ConnectionIdentity>,
}

impl Default for InterruptBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(INTERRUPT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Announces that no one is waiting for `identity`'s result any more.
    /// Returns the number of listeners notified.
    pub fn interrupt(&self, identity: ConnectionIdentity) -> usize {
        self.tx.send(identity).unwrap_or(0)
    }

    pub fn listener(&self) -> InterruptListener {
        self.listener_with_retention(DEFAULT_INTERRUPT_RETENTION)
    }

    pub fn listener_with_retention(&self, retention: Duration) -> InterruptListener {
        InterruptListener {
            rx: self.tx.subscribe(),
            recent: HashMap::new(),
            retention,
        }
    }
}

/// A worker's view of the interrupt channel.
#[derive(Debug)]
pub struct InterruptListener {
    rx: broadcast::Receiver<ConnectionIdentity>,
    recent: HashMap<ConnectionIdentity, Instant>,
    retention: Duration,
}

impl InterruptListener {
    /// Returns true if `identity` has been interrupted within the retention window.
    pub fn is_interrupted(&mut self, identity: &ConnectionIdentity) -> bool {
        let now = Instant::now();
        loop {
            match self.rx.try_recv() {
                Ok(interrupted) => {
                    self.recent.insert(interrupted, now);
                }
                Err(TryRecvError::Lagged(missed)) => {
                    warn!("Interrupt listener lagged, missed {} interrupts.", missed);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        let retention = self.retention;
        self.recent
            .retain(|_, seen| now.saturating_duration_since(*seen) <= retention);
        self.recent.contains_key(identity)
    }
}
