use super::FlagPolicy;
use crate::decision_input::DecisionInput;
use crate::errors::GateResult;
use crate::evaluator::{Evaluator, EvaluatorOutcome};

pub const NAME: &str = "illegal_content";

pub(crate) const POLICY: FlagPolicy = FlagPolicy {
    name: NAME,
    block_flags: &[
        "illegal_activity",
        "fraud",
        "weapons_trafficking",
        "drug_trafficking",
        "hacking",
        "counterfeit",
    ],
    block_reason: "illegal_activity_facilitation",
    rewrite_flags: &[],
    rewrite_reason: "",
    clear_reason: "no_illegal_content_detected",
};

pub struct IllegalContentEvaluator;

impl Evaluator for IllegalContentEvaluator {
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
    fn illegal_flag_blocks() {
        let input = DecisionInputBuilder::new("hi").flag("hacking").build().unwrap();
        assert_eq!(
            IllegalContentEvaluator.evaluate(&input).unwrap().outcome,
            Outcome::Block
        );
    }

    #[test]
    fn other_flags_execute() {
        let input = DecisionInputBuilder::new("hi").flag("distress").build().unwrap();
        assert_eq!(
            IllegalContentEvaluator.evaluate(&input).unwrap().outcome,
            Outcome::Execute
        );
    }
}
