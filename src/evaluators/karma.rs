//! Karma awareness
//!
//! Read-only: karma can nudge toward a rewrite but can never block. The nudge
//! is expressed as EXECUTE with escalation so the resolver treats it as
//! REWRITE.

use crate::decision_input::DecisionInput;
use crate::errors::GateResult;
use crate::evaluator::{ConfidenceTier, Evaluator, EvaluatorOutcome, OutcomeMetadata};

pub const NAME: &str = "karma_awareness";

pub const LOW_KARMA_THRESHOLD: f64 = 0.3;

pub struct KarmaAwarenessEvaluator;

impl Evaluator for KarmaAwarenessEvaluator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn evaluate(&self, input: &DecisionInput) -> GateResult<EvaluatorOutcome> {
        let metadata = OutcomeMetadata::Karma {
            score: input.karma(),
            threshold: LOW_KARMA_THRESHOLD,
        };

        let outcome = match input.karma() {
            None => EvaluatorOutcome::execute(NAME, "karma_not_provided")
                .with_confidence(ConfidenceTier::Low),
            Some(score) if score < LOW_KARMA_THRESHOLD => {
                EvaluatorOutcome::execute(NAME, "low_karma_nudge")
                    .with_confidence(ConfidenceTier::Medium)
                    .with_escalation(true)
            }
            Some(_) => EvaluatorOutcome::execute(NAME, "karma_neutral"),
        };

        Ok(outcome.with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision_input::DecisionInputBuilder;
    use crate::evaluator::Outcome;

    #[test]
    fn missing_karma_is_neutral() {
        let input = DecisionInputBuilder::new("hi").build().unwrap();
        let outcome = KarmaAwarenessEvaluator.evaluate(&input).unwrap();
        assert_eq!(outcome.effective_outcome(), Outcome::Execute);
    }

    #[test]
    fn low_karma_nudges_rewrite() {
        let input = DecisionInputBuilder::new("hi").karma(0.1).build().unwrap();
        let outcome = KarmaAwarenessEvaluator.evaluate(&input).unwrap();
        assert_eq!(outcome.outcome, Outcome::Execute);
        assert!(outcome.escalation);
        assert_eq!(outcome.effective_outcome(), Outcome::Rewrite);
    }

    #[test]
    fn threshold_itself_is_not_low() {
        let input = DecisionInputBuilder::new("hi").karma(0.3).build().unwrap();
        let outcome = KarmaAwarenessEvaluator.evaluate(&input).unwrap();
        assert_eq!(outcome.effective_outcome(), Outcome::Execute);
    }

    #[test]
    fn never_blocks_even_at_floor() {
        let input = DecisionInputBuilder::new("hi").karma(-1.0).build().unwrap();
        let outcome = KarmaAwarenessEvaluator.evaluate(&input).unwrap();
        assert_ne!(outcome.effective_outcome(), Outcome::Block);
    }
}
