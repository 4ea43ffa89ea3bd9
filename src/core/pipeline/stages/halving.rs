// src/core/pipeline/stages/halving.rs

use crate::core::events::{CompletionEvent, WorkUnit};
use crate::core::pipeline::{DecisionPolicy, PipelineStage, StageOutcome};

/// Forwards the first half of the payload, plus one byte, to the next stage.
///
/// Chaining several of these models a multi-hop pipeline where every hop does a
/// bounded share of the work.
#[derive(Debug, Default)]
pub struct HalvingStage {
    policy: DecisionPolicy,
}

impl HalvingStage {
    pub fn new(policy: DecisionPolicy) -> Self {
        Self { policy }
    }
}

impl PipelineStage for HalvingStage {
    fn name(&self) -> &str {
        "halving"
    }

    fn process(&self, unit: WorkUnit) -> StageOutcome {
        if let Some(failed) = self.policy.check(self.name(), &unit) {
            return failed;
        }
        if unit.payload.is_empty() {
            return StageOutcome::Terminal(CompletionEvent::error(&unit, "empty payload"));
        }
        let keep = unit.payload.len() / 2 + 1;
        let half = unit.payload.slice(..keep);
        StageOutcome::Forward(unit.forward(half))
    }
}
