use super::FlagPolicy;
use crate::decision_input::DecisionInput;
use crate::errors::GateResult;
use crate::evaluator::{Evaluator, EvaluatorOutcome};

pub const NAME: &str = "emotional_manipulation";

pub(crate) const POLICY: FlagPolicy = FlagPolicy {
    name: NAME,
    block_flags: &[],
    block_reason: "",
    rewrite_flags: &[
        "guilt_tripping",
        "fear_induction",
        "gaslighting",
        "coercive_persuasion",
        "emotional_blackmail",
    ],
    rewrite_reason: "manipulative_pattern_detected",
    clear_reason: "no_manipulation_detected",
};

pub struct EmotionalManipulationEvaluator;

impl Evaluator for EmotionalManipulationEvaluator {
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
    use crate::evaluator::Outcome;

    #[test]
    fn manipulation_flag_rewrites() {
        let input = DecisionInputBuilder::new("hi").flag("gaslighting").build().unwrap();
        let outcome = EmotionalManipulationEvaluator.evaluate(&input).unwrap();
        assert_eq!(outcome.outcome, Outcome::Rewrite);
        assert!(outcome.escalation);
    }

    #[test]
    fn clean_input_executes() {
        let input = DecisionInputBuilder::new("hi").build().unwrap();
        let outcome = EmotionalManipulationEvaluator.evaluate(&input).unwrap();
        assert_eq!(outcome.effective_outcome(), Outcome::Execute);
    }
}
