// src/core/pipeline/worker.rs

use super::{PipelineStage, StageOutcome, process_guarded};
use crate::core::GatewayError;
use crate::core::events::{CompletionEvent, Topic, WorkUnit};
use crate::core::metrics::STAGE_OUTCOMES_TOTAL;
use crate::core::pubsub::{CompletionBus, InterruptListener};
use crate::core::queue::{WorkQueue, WorkReceiver};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// A worker task serving one stage: dequeue, process, then publish or forward.
pub struct StageWorker {
    stage: Arc<dyn PipelineStage>,
    input: WorkReceiver,
    next: Option<WorkQueue>,
    bus: Arc<CompletionBus>,
    interrupts: InterruptListener,
}

impl StageWorker {
    pub fn new(
        stage: Arc<dyn PipelineStage>,
        input: WorkReceiver,
        next: Option<WorkQueue>,
        bus: Arc<CompletionBus>,
        interrupts: InterruptListener,
    ) -> Self {
        Self {
            stage,
            input,
            next,
            bus,
            interrupts,
        }
    }

    pub fn stage_name(&self) -> &str {
        self.stage.name()
    }

    /// The main run loop. Exits on shutdown or once the input queue is closed and drained.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Worker for stage '{}' started.", self.stage.name());
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Worker for stage '{}' shutting down.", self.stage.name());
                    return;
                }
                maybe_unit = self.input.dequeue() => {
                    match maybe_unit {
                        Some(unit) => {
                            tokio::select! {
                                biased;
                                _ = shutdown_rx.recv() => {
                                    info!("Worker for stage '{}' shutting down mid-unit.", self.stage.name());
                                    return;
                                }
                                _ = self.handle(unit) => {}
                            }
                        }
                        None => {
                            debug!("Input queue for stage '{}' closed.", self.stage.name());
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Processes one unit. Returns the event published for it, or `None` if the
    /// unit was forwarded to the next stage or skipped because its connection
    /// was interrupted.
    ///
    /// The stage itself runs on the blocking pool, so a long computation never
    /// holds a runtime thread that the gateway or connection tasks need.
    pub async fn handle(&mut self, unit: WorkUnit) -> Option<CompletionEvent> {
        let stage_name = self.stage.name().to_string();
        if self.interrupts.is_interrupted(&unit.identity) {
            debug!("Skipping interrupted request {} at stage '{}'", unit.identity, stage_name);
            STAGE_OUTCOMES_TOTAL
                .with_label_values(&[stage_name.as_str(), "interrupted"])
                .inc();
            return None;
        }

        let event = match process_off_runtime(Arc::clone(&self.stage), unit).await {
            StageOutcome::Terminal(event) => event,
            StageOutcome::Forward(forwarded) => match &self.next {
                Some(next) => match next.enqueue(forwarded.clone()) {
                    Ok(()) => {
                        STAGE_OUTCOMES_TOTAL
                            .with_label_values(&[stage_name.as_str(), "forwarded"])
                            .inc();
                        return None;
                    }
                    Err(e) => {
                        warn!("Stage '{}' could not forward {}: {}", stage_name, forwarded.identity, e);
                        CompletionEvent::error(&forwarded, e.to_string())
                    }
                },
                None => CompletionEvent::success(&forwarded, forwarded.payload.clone()),
            },
        };

        let outcome = match event.topic {
            Topic::Success => "success",
            Topic::Error => "error",
        };
        STAGE_OUTCOMES_TOTAL
            .with_label_values(&[stage_name.as_str(), outcome])
            .inc();
        if self.bus.publish(event.clone()) == 0 {
            debug!("Completion for {} had no subscribers", event.identity);
        }
        Some(event)
    }
}

/// Runs `stage` on the blocking pool, keeping its computation off the runtime threads.
async fn process_off_runtime(stage: Arc<dyn PipelineStage>, unit: WorkUnit) -> StageOutcome {
    let stage_name = stage.name().to_string();
    let origin = unit.forward(Bytes::new());
    match tokio::task::spawn_blocking(move || process_guarded(stage.as_ref(), unit)).await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            let e = GatewayError::StageFailure {
                stage: stage_name.clone(),
                reason: format!("task failed: {join_err}"),
            };
            warn!("Stage '{}' lost {}: {}", stage_name, origin.identity, e);
            StageOutcome::Terminal(CompletionEvent::error(&origin, e.to_string()))
        }
    }
}
