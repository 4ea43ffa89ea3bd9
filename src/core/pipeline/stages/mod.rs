// src/core/pipeline/stages/mod.rs

//! The stage implementations available to a configured pipeline.

use super::{DecisionPolicy, PipelineStage};
use std::sync::Arc;
use strum_macros::{Display, EnumString};

pub mod echo;
pub mod halving;
pub mod parse;
pub mod primality;

pub use echo::EchoStage;
pub use halving::HalvingStage;
pub use parse::ParseStage;
pub use primality::PrimalityStage;

/// The stage kinds that can be named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum StageKind {
    Parse,
    Primality,
    Halving,
    Echo,
}

/// Builds a stage of the given kind using `policy` for its failure decisions.
pub fn build(kind: StageKind, policy: DecisionPolicy) -> Arc<dyn PipelineStage> {
    match kind {
        StageKind::Parse => Arc::new(ParseStage::new(policy)),
        StageKind::Primality => Arc::new(PrimalityStage::new(policy)),
        StageKind::Halving => Arc::new(HalvingStage::new(policy)),
        StageKind::Echo => Arc::new(EchoStage::new(policy)),
    }
}
