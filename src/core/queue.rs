// src/core/queue.rs

//! The work queue between the gateway and the pipeline stages.
//!
//! Producers never block: a bounded queue that is at capacity rejects the unit
//! with `QueueFull`. Any number of workers can share one receiver and compete
//! for units.

use crate::core::GatewayError;
use crate::core::events::WorkUnit;
use crate::core::metrics::{QUEUE_FULL_TOTAL, WORK_QUEUE_DEPTH};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};

/// Creates a work queue named `name`. `bound` of `None` means unbounded.
pub fn work_queue(name: &str, bound: Option<usize>) -> (WorkQueue, WorkReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let name: Arc<str> = Arc::from(name);
    let depth = Arc::new(AtomicUsize::new(0));
    WORK_QUEUE_DEPTH.with_label_values(&[&*name]).set(0.0);
    (
        WorkQueue {
            name: name.clone(),
            tx,
            depth: depth.clone(),
            bound,
        },
        WorkReceiver {
            name,
            rx: Arc::new(Mutex::new(rx)),
            depth,
        },
    )
}

/// The producing side of a work queue.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<WorkUnit>,
    depth: Arc<AtomicUsize>,
    bound: Option<usize>,
}

impl WorkQueue {
    /// Pushes a unit without waiting.
    pub fn enqueue(&self, unit: WorkUnit) -> Result<(), GatewayError> {
        match self.bound {
            Some(bound) => {
                let reserved =
                    self.depth
                        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                            (depth < bound).then_some(depth + 1)
                        });
                if let Err(depth) = reserved {
                    QUEUE_FULL_TOTAL.with_label_values(&[&*self.name]).inc();
                    return Err(GatewayError::QueueFull {
                        queue: self.name.to_string(),
                        depth,
                    });
                }
            }
            None => {
                self.depth.fetch_add(1, Ordering::AcqRel);
            }
        }

        if self.tx.send(unit).is_err() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            return Err(GatewayError::QueueClosed(self.name.to_string()));
        }
        WORK_QUEUE_DEPTH
            .with_label_values(&[&*self.name])
            .set(self.depth() as f64);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn bound(&self) -> Option<usize> {
        self.bound
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The consuming side of a work queue. Clones share the same underlying queue.
#[derive(Debug, Clone)]
pub struct WorkReceiver {
    name: Arc<str>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<WorkUnit>>>,
    depth: Arc<AtomicUsize>,
}

impl WorkReceiver {
    /// Waits for the next unit. Returns `None` once every producer is gone and
    /// the queue is empty.
    pub async fn dequeue(&self) -> Option<WorkUnit> {
        let unit = self.rx.lock().await.recv().await?;
        let depth = self.depth.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        WORK_QUEUE_DEPTH
            .with_label_values(&[&*self.name])
            .set(depth as f64);
        Some(unit)
    }

    /// Takes a unit if one is immediately available.
    pub fn try_dequeue(&self) -> Option<WorkUnit> {
        let mut rx = self.rx.try_lock().ok()?;
        let unit = rx.try_recv().ok()?;
        let depth = self.depth.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        WORK_QUEUE_DEPTH
            .with_label_values(&[&*self.name])
            .set(depth as f64);
        Some(unit)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }
}
