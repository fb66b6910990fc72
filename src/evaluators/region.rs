//! Region restriction
//!
//! No jurisdiction guessing: a missing or `UNKNOWN` region blocks outright.

use super::intent_keywords;
use crate::decision_input::DecisionInput;
use crate::errors::GateResult;
use crate::evaluator::{Evaluator, EvaluatorOutcome, OutcomeMetadata};

pub const NAME: &str = "region_restriction";

/// Regions where execution is refused outright
pub const RESTRICTED_REGIONS: &[&str] = &["CN", "KP", "IR", "SY"];

/// Regions where only policy-sensitive intents are refused
pub const INTENT_RESTRICTED_REGIONS: &[&str] = &["EU", "UK"];

pub const SENSITIVE_INTENT_KEYWORDS: &[&str] = &[
    "gambling",
    "crypto",
    "financial advice",
    "politics",
    "election",
    "weapon",
    "drug",
    "illegal",
];

pub struct RegionRestrictionEvaluator;

impl Evaluator for RegionRestrictionEvaluator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn evaluate(&self, input: &DecisionInput) -> GateResult<EvaluatorOutcome> {
        let region = match input.region() {
            None => {
                return Ok(EvaluatorOutcome::block(NAME, "invalid_region_policy").with_metadata(
                    OutcomeMetadata::Jurisdiction {
                        code: None,
                        matched_keywords: Vec::new(),
                    },
                ))
            }
            Some(region) => region,
        };

        let metadata = |matched_keywords: Vec<String>| OutcomeMetadata::Jurisdiction {
            code: Some(region.to_string()),
            matched_keywords,
        };

        if region == "UNKNOWN" {
            return Ok(EvaluatorOutcome::block(NAME, "unknown_region_policy")
                .with_metadata(metadata(Vec::new())));
        }

        if RESTRICTED_REGIONS.contains(&region) {
            return Ok(EvaluatorOutcome::block(NAME, "region_restricted")
                .with_metadata(metadata(Vec::new())));
        }

        let sensitive = intent_keywords(input, SENSITIVE_INTENT_KEYWORDS);
        if !sensitive.is_empty() {
            if input.signals().vpn_suspected() {
                return Ok(
                    EvaluatorOutcome::block(NAME, "vpn_ambiguity_with_restricted_intent")
                        .with_metadata(metadata(sensitive)),
                );
            }
            if INTENT_RESTRICTED_REGIONS.contains(&region) {
                return Ok(EvaluatorOutcome::block(NAME, "region_restricted_intent")
                    .with_metadata(metadata(sensitive)));
            }
        }

        Ok(EvaluatorOutcome::execute(NAME, "region_policy_compliant")
            .with_metadata(metadata(Vec::new())))
    }
}
