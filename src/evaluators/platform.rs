use super::intent_keywords;
use crate::decision_input::DecisionInput;
use crate::errors::GateResult;
use crate::evaluator::{Evaluator, EvaluatorOutcome, OutcomeMetadata};

pub const NAME: &str = "platform_policy";

pub const RESTRICTED_PLATFORMS: &[&str] = &["KIDS_APP", "EDUCATION_UNDER_13", "SANDBOX_RESTRICTED"];

/// App-store platforms with stricter content rules
pub const STORE_PLATFORMS: &[&str] = &["IOS", "ANDROID"];

pub const RESTRICTED_CONTENT_KEYWORDS: &[&str] = &[
    "sexual",
    "porn",
    "nude",
    "hate",
    "harassment",
    "violence",
    "illegal",
    "drug",
    "weapon",
];

/// Platform policy: unknown or explicitly restricted platforms never execute
pub struct PlatformPolicyEvaluator;

impl Evaluator for PlatformPolicyEvaluator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn evaluate(&self, input: &DecisionInput) -> GateResult<EvaluatorOutcome> {
        let platform = match input.platform() {
            None => {
                return Ok(EvaluatorOutcome::block(NAME, "invalid_platform_policy").with_metadata(
                    OutcomeMetadata::Jurisdiction {
                        code: None,
                        matched_keywords: Vec::new(),
                    },
                ))
            }
            Some(platform) => platform,
        };

        let metadata = |matched_keywords: Vec<String>| OutcomeMetadata::Jurisdiction {
            code: Some(platform.to_string()),
            matched_keywords,
        };

        if platform == "UNKNOWN" {
            return Ok(EvaluatorOutcome::block(NAME, "unknown_platform_policy")
                .with_metadata(metadata(Vec::new())));
        }

        if RESTRICTED_PLATFORMS.contains(&platform) {
            return Ok(EvaluatorOutcome::block(NAME, "platform_explicitly_restricted")
                .with_metadata(metadata(Vec::new())));
        }

        if STORE_PLATFORMS.contains(&platform) {
            let matched = intent_keywords(input, RESTRICTED_CONTENT_KEYWORDS);
            if !matched.is_empty() {
                return Ok(EvaluatorOutcome::block(NAME, "platform_content_violation")
                    .with_metadata(metadata(matched)));
            }
        }

        Ok(EvaluatorOutcome::execute(NAME, "platform_policy_compliant")
            .with_metadata(metadata(Vec::new())))
    }
}
