// src/core/pipeline/policy.rs

//! Injectable failure decisions for pipeline stages.
//!
//! Every stage consults its `DecisionPolicy` before doing any work. Policies are
//! pure functions of the work unit, so the same unit always gets the same
//! decision.

use super::StageOutcome;
use crate::core::events::{CompletionEvent, WorkUnit};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;

/// What a policy decided for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Fail,
}

/// A rule deciding the fate of a unit.
pub type Rule = Arc<dyn Fn(&WorkUnit) -> Decision + Send + Sync>;

#[derive(Clone, Default)]
pub enum DecisionPolicy {
    #[default]
    AlwaysSucceed,
    AlwaysFail,
    RuleBased(Rule),
}

impl fmt::Debug for DecisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionPolicy::AlwaysSucceed => write!(f, "AlwaysSucceed"),
            DecisionPolicy::AlwaysFail => write!(f, "AlwaysFail"),
            DecisionPolicy::RuleBased(_) => write!(f, "RuleBased(..)"),
        }
    }
}

impl DecisionPolicy {
    pub fn rule(f: impl Fn(&WorkUnit) -> Decision + Send + Sync + 'static) -> Self {
        DecisionPolicy::RuleBased(Arc::new(f))
    }

    /// Fails every unit whose connection token ends in an even byte.
    pub fn identity_parity() -> Self {
        Self::rule(|unit| match unit.identity.token().last() {
            Some(b) if b % 2 == 0 => Decision::Fail,
            _ => Decision::Proceed,
        })
    }

    /// Fails roughly `failure_ratio` of units. The draw for a unit depends only on
    /// `seed` and the unit's identity.
    pub fn seeded_random(seed: u64, failure_ratio: f64) -> Self {
        let ratio = failure_ratio.clamp(0.0, 1.0);
        Self::rule(move |unit| {
            let mut rng = SmallRng::seed_from_u64(seed ^ identity_hash(unit));
            if rng.gen_bool(ratio) {
                Decision::Fail
            } else {
                Decision::Proceed
            }
        })
    }

    pub fn decide(&self, unit: &WorkUnit) -> Decision {
        match self {
            DecisionPolicy::AlwaysSucceed => Decision::Proceed,
            DecisionPolicy::AlwaysFail => Decision::Fail,
            DecisionPolicy::RuleBased(rule) => rule(unit),
        }
    }

    /// Returns the terminal error outcome for `unit` if the policy fails it.
    pub fn check(&self, stage: &str, unit: &WorkUnit) -> Option<StageOutcome> {
        match self.decide(unit) {
            Decision::Proceed => None,
            Decision::Fail => Some(StageOutcome::Terminal(CompletionEvent::error(
                unit,
                format!("stage '{stage}' rejected the request"),
            ))),
        }
    }
}

/// FNV-1a over the identity's token and generation.
fn identity_hash(unit: &WorkUnit) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    unit.identity
        .token()
        .iter()
        .copied()
        .chain(unit.identity.generation().to_be_bytes())
        .fold(OFFSET, |hash, b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}
