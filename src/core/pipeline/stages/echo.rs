// src/core/pipeline/stages/echo.rs

use crate::core::events::{CompletionEvent, WorkUnit};
use crate::core::pipeline::{DecisionPolicy, PipelineStage, StageOutcome};

/// Completes every unit successfully with its payload unchanged.
#[derive(Debug, Default)]
pub struct EchoStage {
    policy: DecisionPolicy,
}

impl EchoStage {
    pub fn new(policy: DecisionPolicy) -> Self {
        Self { policy }
    }
}

impl PipelineStage for EchoStage {
    fn name(&self) -> &str {
        "echo"
    }

    fn process(&self, unit: WorkUnit) -> StageOutcome {
        if let Some(failed) = self.policy.check(self.name(), &unit) {
            return failed;
        }
        StageOutcome::Terminal(CompletionEvent::success(&unit, unit.payload.clone()))
    }
}
