//! Signal evaluators
//!
//! Each evaluator reads one facet of the [`DecisionInput`] and nothing else.
//! None of them sees another evaluator's outcome.

use crate::decision_input::DecisionInput;
use crate::evaluator::{ConfidenceTier, Evaluator, EvaluatorOutcome, OutcomeMetadata};
use std::sync::Arc;

pub mod age;
pub mod dependency_tone;
pub mod emotional_manipulation;
pub mod illegal_content;
pub mod karma;
pub mod platform;
pub mod region;
pub mod safety_risk;
pub mod sexual_escalation;

pub use age::AgeComplianceEvaluator;
pub use dependency_tone::DependencyToneEvaluator;
pub use emotional_manipulation::EmotionalManipulationEvaluator;
pub use illegal_content::IllegalContentEvaluator;
pub use karma::KarmaAwarenessEvaluator;
pub use platform::PlatformPolicyEvaluator;
pub use region::RegionRestrictionEvaluator;
pub use safety_risk::SafetyRiskEvaluator;
pub use sexual_escalation::SexualEscalationEvaluator;

/// The fixed signal evaluator set, in audit order
pub fn standard_set() -> Vec<Arc<dyn Evaluator>> {
    vec![
        Arc::new(AgeComplianceEvaluator),
        Arc::new(RegionRestrictionEvaluator),
        Arc::new(PlatformPolicyEvaluator),
        Arc::new(SafetyRiskEvaluator),
        Arc::new(SexualEscalationEvaluator),
        Arc::new(DependencyToneEvaluator),
        Arc::new(EmotionalManipulationEvaluator),
        Arc::new(IllegalContentEvaluator),
        Arc::new(KarmaAwarenessEvaluator),
    ]
}

/// Risk-flag table shared by the flag-driven evaluators
pub(crate) struct FlagPolicy {
    pub name: &'static str,
    pub block_flags: &'static [&'static str],
    pub block_reason: &'static str,
    pub rewrite_flags: &'static [&'static str],
    pub rewrite_reason: &'static str,
    pub clear_reason: &'static str,
}

impl FlagPolicy {
    /// BLOCK on any block flag, else REWRITE on any rewrite flag, else EXECUTE
    pub fn apply(&self, input: &DecisionInput) -> EvaluatorOutcome {
        let blocking = input.matching_flags(self.block_flags);
        if !blocking.is_empty() {
            return EvaluatorOutcome::block(self.name, self.block_reason)
                .with_metadata(OutcomeMetadata::MatchedFlags { flags: blocking });
        }

        let rewriting = input.matching_flags(self.rewrite_flags);
        if !rewriting.is_empty() {
            return EvaluatorOutcome::rewrite(self.name, self.rewrite_reason)
                .with_metadata(OutcomeMetadata::MatchedFlags { flags: rewriting });
        }

        EvaluatorOutcome::execute(self.name, self.clear_reason).with_confidence(ConfidenceTier::High)
    }
}

/// Keywords from `keywords` found in the lowercased intent
pub(crate) fn intent_keywords(input: &DecisionInput, keywords: &[&str]) -> Vec<String> {
    let intent = input.intent().to_lowercase();
    keywords
        .iter()
        .filter(|keyword| intent.contains(*keyword))
        .map(|keyword| keyword.to_string())
        .collect()
}
