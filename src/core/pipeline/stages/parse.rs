// src/core/pipeline/stages/parse.rs

use crate::core::events::{CompletionEvent, WorkUnit};
use crate::core::pipeline::{DecisionPolicy, PipelineStage, StageOutcome};
use crate::core::protocol::{HttpRequest, Method};

/// The diagnostic returned for any request the prime checker cannot serve.
pub const USAGE: &str = "GET requests should look like: '/is_prime?possible_prime=SOME_NUMBER'";

const PATH: &str = "/is_prime";
const PARAM: &str = "possible_prime";

/// Extracts the number to test from a raw `GET /is_prime?possible_prime=N` request
/// and forwards it as decimal text.
#[derive(Debug, Default)]
pub struct ParseStage {
    policy: DecisionPolicy,
}

impl ParseStage {
    pub fn new(policy: DecisionPolicy) -> Self {
        Self { policy }
    }
}

impl PipelineStage for ParseStage {
    fn name(&self) -> &str {
        "parse"
    }

    fn process(&self, unit: WorkUnit) -> StageOutcome {
        if let Some(failed) = self.policy.check(self.name(), &unit) {
            return failed;
        }

        let request = match HttpRequest::parse(&unit.payload) {
            Ok(request) => request,
            Err(e) => return StageOutcome::Terminal(CompletionEvent::error(&unit, e.to_string())),
        };
        if request.method != Method::Get {
            return StageOutcome::Terminal(CompletionEvent::error(
                &unit,
                "Only GET requests supported",
            ));
        }

        let number = match request.query_values(PARAM) {
            Some([value]) if request.path == PATH => value.trim().parse::<u64>().ok(),
            _ => None,
        };
        match number {
            Some(n) => StageOutcome::Forward(unit.forward(n.to_string())),
            None => StageOutcome::Terminal(CompletionEvent::error(&unit, USAGE)),
        }
    }
}
