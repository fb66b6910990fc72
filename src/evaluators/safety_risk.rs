use super::FlagPolicy;
use crate::decision_input::DecisionInput;
use crate::errors::GateResult;
use crate::evaluator::{Evaluator, EvaluatorOutcome};

pub const NAME: &str = "safety_risk";

pub(crate) const POLICY: FlagPolicy = FlagPolicy {
    name: NAME,
    block_flags: &["self_harm", "high_risk", "violence", "terror", "critical_threat"],
    block_reason: "severe_safety_risk",
    rewrite_flags: &["distress", "aggression", "risky_behavior", "substance_use"],
    rewrite_reason: "safety_risk_requires_softening",
    clear_reason: "no_safety_risk_detected",
};

pub struct SafetyRiskEvaluator;

impl Evaluator for SafetyRiskEvaluator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn evaluate(&self, input: &DecisionInput) -> GateResult<EvaluatorOutcome> {
        Ok(POLICY.apply(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision_input::DecisionInputBuilder;
    use crate::evaluator::{ConfidenceTier, Outcome, OutcomeMetadata};

    #[test]
    fn blocking_flag_wins_over_rewrite_flag() {
        let input = DecisionInputBuilder::new("hi")
            .flag("distress")
            .flag("self_harm")
            .build()
            .unwrap();
        let outcome = SafetyRiskEvaluator.evaluate(&input).unwrap();
        assert_eq!(outcome.outcome, Outcome::Block);
        assert_eq!(
            outcome.metadata,
            OutcomeMetadata::MatchedFlags {
                flags: vec!["self_harm".to_string()]
            }
        );
    }

    #[test]
    fn rewrite_flag_softens() {
        let input = DecisionInputBuilder::new("hi").flag("DISTRESS").build().unwrap();
        let outcome = SafetyRiskEvaluator.evaluate(&input).unwrap();
        assert_eq!(outcome.outcome, Outcome::Rewrite);
        assert_eq!(outcome.confidence, ConfidenceTier::Medium);
    }

    #[test]
    fn unrelated_flags_execute() {
        let input = DecisionInputBuilder::new("hi").flag("fraud").build().unwrap();
        assert_eq!(
            SafetyRiskEvaluator.evaluate(&input).unwrap().outcome,
            Outcome::Execute
        );
    }
}
