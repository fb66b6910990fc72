use super::FlagPolicy;
use crate::decision_input::DecisionInput;
use crate::errors::GateResult;
use crate::evaluator::{Evaluator, EvaluatorOutcome, OutcomeMetadata};

pub const NAME: &str = "dependency_tone";

/// Signal score at or above which dependency is assumed without a flag
pub const DEPENDENCY_SCORE_THRESHOLD: f64 = 0.8;

pub(crate) const POLICY: FlagPolicy = FlagPolicy {
    name: NAME,
    block_flags: &[],
    block_reason: "",
    rewrite_flags: &[
        "emotional_dependency",
        "exclusivity",
        "dependency_bait",
        "isolation_encouragement",
    ],
    rewrite_reason: "dependency_tone_detected",
    clear_reason: "healthy_tone",
};

/// Never blocks; dependency or exclusivity cues force a rewrite
pub struct DependencyToneEvaluator;

impl Evaluator for DependencyToneEvaluator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn evaluate(&self, input: &DecisionInput) -> GateResult<EvaluatorOutcome> {
        let outcome = POLICY.apply(input);
        if outcome.effective_outcome() == crate::evaluator::Outcome::Execute
            && input.signals().dependency_score() >= DEPENDENCY_SCORE_THRESHOLD
        {
            return Ok(EvaluatorOutcome::rewrite(NAME, "high_dependency_score")
                .with_metadata(OutcomeMetadata::MatchedFlags { flags: Vec::new() }));
        }
        Ok(outcome)
    }
}
