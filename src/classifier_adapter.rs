//! Bridges a [`DecisionInput`] to the behavioral classifier
//!
//! The adapter owns the text serialization and context derivation, runs the
//! classifier in isolation and maps its verdict onto an evaluator outcome.
//! Unlike ordinary evaluators a failure here is not absorbed: it surfaces as
//! [`ClassifierFailure`] and the resolver terminates the decision.

use crate::behavior_classifier::{BehaviorClassifier, ClassifierContext, ClassifierVerdict, DecisionTier};
use crate::canonicalize::canonicalize_json;
use crate::decision_input::DecisionInput;
use crate::evaluator::{panic_message, ConfidenceTier, EvaluatorOutcome, Outcome, OutcomeMetadata};
use crate::pattern_library::ContextLists;
use serde_json::Value;
use std::fmt::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

pub const NAME: &str = "behavioral_classifier";

/// Why the classifier could not produce a usable verdict
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierFailure {
    pub detail: String,
}

/// Successful classification together with its mapped outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierReport {
    pub verdict: ClassifierVerdict,
    pub outcome: EvaluatorOutcome,
}

/// Lowercased serialization the patterns are matched against
pub fn serialize_for_classifier(input: &DecisionInput) -> String {
    let signals = input.signals();
    let mut text = format!(
        "intent: {} | tone: {} | dependency_score: {}",
        input.intent(),
        signals.tone(),
        signals.dependency_score()
    );
    for (key, value) in signals.extra() {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => canonicalize_json(other).unwrap_or_else(|_| other.to_string()),
        };
        // writing into a String cannot fail
        let _ = write!(text, " | {}: {}", key, rendered);
    }
    text.to_lowercase()
}

pub fn context_for(input: &DecisionInput, lists: &ContextLists) -> ClassifierContext {
    let region = input.region().unwrap_or_default();
    let platform = input.platform().unwrap_or_default();
    ClassifierContext {
        adult: input.age_gate().is_adult(),
        strict_mode: lists.strict_regions.contains(region),
        restricted_region: lists.conflict_regions.contains(region),
        zero_tolerance: lists.zero_tolerance_platforms.contains(platform),
        minor_protection: lists.minor_protection_platforms.contains(platform),
        karma_bias: input.karma().map(|k| k.clamp(0.0, 1.0)).unwrap_or(0.5),
    }
}

pub fn tier_to_outcome(tier: DecisionTier) -> Outcome {
    match tier {
        DecisionTier::HardDeny => Outcome::Block,
        DecisionTier::SoftRewrite => Outcome::Rewrite,
        DecisionTier::Allow => Outcome::Execute,
    }
}

fn confidence_tier(verdict: &ClassifierVerdict) -> ConfidenceTier {
    if verdict.decision_tier == DecisionTier::Allow || verdict.confidence >= 80.0 {
        ConfidenceTier::High
    } else if verdict.confidence >= 50.0 {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

#[derive(Clone)]
pub struct ClassifierAdapter {
    classifier: Arc<dyn BehaviorClassifier>,
    lists: ContextLists,
}

impl ClassifierAdapter {
    pub fn new(classifier: Arc<dyn BehaviorClassifier>, lists: ContextLists) -> Self {
        Self { classifier, lists }
    }

    pub fn classifier_version(&self) -> &str {
        self.classifier.version()
    }

    pub fn assess(&self, input: &DecisionInput) -> Result<ClassifierReport, ClassifierFailure> {
        let text = serialize_for_classifier(input);
        let context = context_for(input, &self.lists);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.classifier.classify(&text, &context)
        }));

        let verdict = match result {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(err)) => {
                return Err(ClassifierFailure {
                    detail: err.to_string(),
                })
            }
            Err(payload) => {
                return Err(ClassifierFailure {
                    detail: format!("classifier panicked: {}", panic_message(payload.as_ref())),
                })
            }
        };

        verdict.validate().map_err(|err| ClassifierFailure {
            detail: err.to_string(),
        })?;

        let outcome = EvaluatorOutcome::new(NAME, tier_to_outcome(verdict.decision_tier), &verdict.reason_code)
            .with_confidence(confidence_tier(&verdict))
            .with_metadata(OutcomeMetadata::Classifier {
                decision_tier: verdict.decision_tier.as_str().to_string(),
                risk_category: verdict.risk_category.as_str().to_string(),
                confidence: verdict.confidence,
                evidence: verdict.evidence.clone(),
            });

        Ok(ClassifierReport { verdict, outcome })
    }
}
