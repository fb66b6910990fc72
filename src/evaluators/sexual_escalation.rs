use super::FlagPolicy;
use crate::decision_input::DecisionInput;
use crate::errors::GateResult;
use crate::evaluator::{Evaluator, EvaluatorOutcome};

pub const NAME: &str = "sexual_escalation";

pub(crate) const POLICY: FlagPolicy = FlagPolicy {
    name: NAME,
    block_flags: &[
        "sexual_escalation",
        "sexual_minors",
        "explicit_sexual_content",
        "sexual_exploitation",
    ],
    block_reason: "hard_sexual_content",
    rewrite_flags: &["sexual_suggestive", "romantic_dependency", "sexual_boundary_blur"],
    rewrite_reason: "sexual_boundary_blur",
    clear_reason: "no_sexual_risk_detected",
};

pub struct SexualEscalationEvaluator;

impl Evaluator for SexualEscalationEvaluator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn evaluate(&self, input: &DecisionInput) -> GateResult<EvaluatorOutcome> {
        Ok(POLICY.apply(input))
    }
}
