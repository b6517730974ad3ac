//! Deterministic, explainable rule-based model routing.

mod registry;
mod router;

pub use registry::{ModelRegistry, ModelSpec};
pub use router::{ModelRouter, NoCandidate, RouterDecision, RouterExplanation, RouterRule, RuleCondition};
