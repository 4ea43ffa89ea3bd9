// src/core/pipeline/stages/primality.rs

use crate::core::events::{CompletionEvent, WorkUnit};
use crate::core::pipeline::{DecisionPolicy, PipelineStage, StageOutcome};

/// Tests a decimal number for primality.
///
/// A prime completes with the number itself; a composite completes with its
/// smallest prime factor.
#[derive(Debug, Default)]
pub struct PrimalityStage {
    policy: DecisionPolicy,
}

impl PrimalityStage {
    pub fn new(policy: DecisionPolicy) -> Self {
        Self { policy }
    }
}

impl PipelineStage for PrimalityStage {
    fn name(&self) -> &str {
        "primality"
    }

    fn process(&self, unit: WorkUnit) -> StageOutcome {
        if let Some(failed) = self.policy.check(self.name(), &unit) {
            return failed;
        }

        let parsed = std::str::from_utf8(&unit.payload)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok());
        let event = match parsed {
            Some(n) if n >= 2 => CompletionEvent::success(&unit, smallest_factor(n).to_string()),
            Some(n) => CompletionEvent::error(&unit, format!("{n} is neither prime nor composite")),
            None => CompletionEvent::error(&unit, "expected a non-negative decimal number"),
        };
        StageOutcome::Terminal(event)
    }
}

/// Returns the smallest prime factor of `n`, which is `n` itself when `n` is prime.
/// `n` must be at least 2.
pub fn smallest_factor(n: u64) -> u64 {
    if n % 2 == 0 {
        return 2;
    }
    let mut divisor = 3u64;
    while u128::from(divisor) * u128::from(divisor) <= u128::from(n) {
        if n % divisor == 0 {
            return divisor;
        }
        divisor += 2;
    }
    n
}
