// src/core/pipeline/mod.rs

//! The backend pipeline: an ordered chain of stages, each fed by its own work
//! queue and served by independent worker tasks.
//!
//! A stage either finishes a unit with a terminal completion event or forwards a
//! derived unit to the next stage. A unit forwarded past the last stage
//! completes successfully with the forwarded payload.

use crate::config::PipelineConfig;
use crate::core::GatewayError;
use crate::core::events::{CompletionEvent, WorkUnit};
use crate::core::pubsub::{CompletionBus, InterruptBus};
use crate::core::queue::{WorkQueue, work_queue};
use bytes::Bytes;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

pub mod policy;
pub mod stages;
pub mod worker;

pub use policy::{Decision, DecisionPolicy};
pub use worker::StageWorker;

/// The result of one stage processing one unit.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Terminal(CompletionEvent),
    Forward(WorkUnit),
}

/// A single unit of backend processing.
///
/// Implementations must be deterministic: the same unit and configuration must
/// always produce the same outcome.
pub trait PipelineStage: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn process(&self, unit: WorkUnit) -> StageOutcome;
}

/// Runs a stage, turning a panic into an `Error` event for the unit.
pub fn process_guarded(stage: &dyn PipelineStage, unit: WorkUnit) -> StageOutcome {
    let origin = unit.forward(Bytes::new());
    match panic::catch_unwind(AssertUnwindSafe(|| stage.process(unit))) {
        Ok(outcome) => outcome,
        Err(_) => {
            error!("Stage '{}' panicked processing {}", stage.name(), origin.identity);
            let e = GatewayError::StageFailure {
                stage: stage.name().to_string(),
                reason: "panicked".to_string(),
            };
            StageOutcome::Terminal(CompletionEvent::error(&origin, e.to_string()))
        }
    }
}

/// The entry point of a running pipeline plus the workers serving it.
pub struct PipelineHandles {
    pub entry: WorkQueue,
    pub workers: Vec<StageWorker>,
}

/// An ordered list of stages.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn PipelineStage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the configured stages, all sharing the configured failure policy.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let policy = config.failure_policy.to_policy();
        let mut pipeline = Self::new();
        for kind in &config.stages {
            pipeline.push(stages::build(*kind, policy.clone()));
        }
        pipeline
    }

    /// Appends a stage to the end of the pipeline.
    pub fn stage(mut self, stage: impl PipelineStage) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn push(&mut self, stage: Arc<dyn PipelineStage>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Drives `unit` through every stage on the calling thread.
    pub fn run_to_completion(&self, unit: WorkUnit) -> CompletionEvent {
        let mut current = unit;
        for stage in &self.stages {
            match process_guarded(stage.as_ref(), current) {
                StageOutcome::Terminal(event) => return event,
                StageOutcome::Forward(next) => current = next,
            }
        }
        CompletionEvent::success(&current, current.payload.clone())
    }

    /// Creates one work queue per stage, each bounded by `queue_bound`, and
    /// `workers_per_stage` workers for every stage. The workers still need to be
    /// spawned; the returned entry queue feeds the first stage.
    pub fn build(
        &self,
        queue_bound: Option<usize>,
        workers_per_stage: usize,
        bus: Arc<CompletionBus>,
        interrupts: &InterruptBus,
    ) -> PipelineHandles {
        let queues: Vec<_> = self
            .stages
            .iter()
            .enumerate()
            .map(|(i, stage)| work_queue(&format!("{i}-{}", stage.name()), queue_bound))
            .collect();

        let mut workers = Vec::with_capacity(self.stages.len() * workers_per_stage);
        for (i, stage) in self.stages.iter().enumerate() {
            let next = queues.get(i + 1).map(|(tx, _)| tx.clone());
            for _ in 0..workers_per_stage {
                workers.push(StageWorker::new(
                    stage.clone(),
                    queues[i].1.clone(),
                    next.clone(),
                    bus.clone(),
                    interrupts.listener(),
                ));
            }
        }

        let entry = match queues.into_iter().next() {
            Some((tx, _)) => tx,
            // A pipeline without stages still needs an entry point; nothing consumes it.
            None => work_queue("empty", queue_bound).0,
        };
        PipelineHandles { entry, workers }
    }
}
