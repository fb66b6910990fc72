use crate::decision_input::{AgeGate, DecisionInput};
use crate::errors::GateResult;
use crate::evaluator::{Evaluator, EvaluatorOutcome, OutcomeMetadata};

pub const NAME: &str = "age_compliance";

/// Only a verified adult passes; minors and unknown state block
pub struct AgeComplianceEvaluator;

impl Evaluator for AgeComplianceEvaluator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn evaluate(&self, input: &DecisionInput) -> GateResult<EvaluatorOutcome> {
        let (outcome, state) = match input.age_gate() {
            AgeGate::Adult => (EvaluatorOutcome::execute(NAME, "age_verified"), "adult"),
            AgeGate::Minor => (EvaluatorOutcome::block(NAME, "minor_detected"), "minor"),
            AgeGate::Unknown => (EvaluatorOutcome::block(NAME, "age_unverified"), "unknown"),
        };
        Ok(outcome.with_metadata(OutcomeMetadata::AgeGate {
            state: state.to_string(),
        }))
    }
}
