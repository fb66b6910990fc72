//! Evaluator contract and the fixed evaluator pipeline
//!
//! Every evaluator is a pure function from a [`DecisionInput`] to exactly one
//! [`EvaluatorOutcome`]. The pipeline isolates evaluators from one another: an
//! error, a panic or a malformed outcome from one of them is converted into a
//! synthetic BLOCK so a broken evaluator can never be outvoted.

use crate::decision_input::DecisionInput;
use crate::errors::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Reason code for a synthetic outcome replacing a failed evaluator
pub const EVALUATOR_FAILURE: &str = "evaluator_failure";

/// Per-evaluator outcome category, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Execute,
    Rewrite,
    Block,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Execute => "EXECUTE",
            Outcome::Rewrite => "REWRITE",
            Outcome::Block => "BLOCK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

/// Evaluator-family specific provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeMetadata {
    None,
    AgeGate {
        state: String,
    },
    Jurisdiction {
        code: Option<String>,
        matched_keywords: Vec<String>,
    },
    MatchedFlags {
        flags: Vec<String>,
    },
    Karma {
        score: Option<f64>,
        threshold: f64,
    },
    Classifier {
        decision_tier: String,
        risk_category: String,
        confidence: f64,
        evidence: Vec<String>,
    },
    Failure {
        detail: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorOutcome {
    pub evaluator: String,
    pub outcome: Outcome,
    pub reason_code: String,
    pub confidence: ConfidenceTier,
    pub escalation: bool,
    pub metadata: OutcomeMetadata,
}

impl EvaluatorOutcome {
    pub fn new(evaluator: &str, outcome: Outcome, reason_code: &str) -> Self {
        Self {
            evaluator: evaluator.to_string(),
            outcome,
            reason_code: reason_code.to_string(),
            confidence: ConfidenceTier::High,
            escalation: outcome != Outcome::Execute,
            metadata: OutcomeMetadata::None,
        }
    }

    pub fn execute(evaluator: &str, reason_code: &str) -> Self {
        Self::new(evaluator, Outcome::Execute, reason_code)
    }

    pub fn rewrite(evaluator: &str, reason_code: &str) -> Self {
        Self::new(evaluator, Outcome::Rewrite, reason_code).with_confidence(ConfidenceTier::Medium)
    }

    pub fn block(evaluator: &str, reason_code: &str) -> Self {
        Self::new(evaluator, Outcome::Block, reason_code)
    }

    /// Synthetic outcome standing in for an evaluator that failed
    pub fn failure(evaluator: &str, detail: impl Into<String>) -> Self {
        Self::block(evaluator, EVALUATOR_FAILURE)
            .with_escalation(true)
            .with_metadata(OutcomeMetadata::Failure {
                detail: detail.into(),
            })
    }

    pub fn with_confidence(mut self, confidence: ConfidenceTier) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_escalation(mut self, escalation: bool) -> Self {
        self.escalation = escalation;
        self
    }

    pub fn with_metadata(mut self, metadata: OutcomeMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Outcome as it participates in the merge: escalation lifts EXECUTE to
    /// REWRITE and never lowers anything.
    pub fn effective_outcome(&self) -> Outcome {
        if self.escalation && self.outcome == Outcome::Execute {
            Outcome::Rewrite
        } else {
            self.outcome
        }
    }

    fn check_well_formed(&self, expected_name: &str) -> GateResult<()> {
        if self.evaluator != expected_name {
            return Err(GateError::evaluator(
                expected_name,
                format!("outcome reported under foreign name '{}'", self.evaluator),
            ));
        }
        if self.reason_code.trim().is_empty() {
            return Err(GateError::evaluator(expected_name, "blank reason code"));
        }
        Ok(())
    }
}

/// A single signal evaluator
pub trait Evaluator: Send + Sync {
    /// Stable identifier written to the audit log
    fn name(&self) -> &'static str;

    fn evaluate(&self, input: &DecisionInput) -> GateResult<EvaluatorOutcome>;
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Ordered, closed set of evaluators
#[derive(Clone)]
pub struct EvaluatorPipeline {
    evaluators: Vec<Arc<dyn Evaluator>>,
}

impl EvaluatorPipeline {
    pub fn new(evaluators: Vec<Arc<dyn Evaluator>>) -> Self {
        Self { evaluators }
    }

    /// The standard signal evaluators, excluding the behavioral classifier
    pub fn standard() -> Self {
        Self::new(crate::evaluators::standard_set())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.evaluators.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }

    /// Run every evaluator once. Always returns one outcome per evaluator.
    pub fn run(&self, input: &DecisionInput) -> Vec<EvaluatorOutcome> {
        self.evaluators
            .iter()
            .map(|evaluator| run_isolated(evaluator.as_ref(), input))
            .collect()
    }
}

fn run_isolated(evaluator: &dyn Evaluator, input: &DecisionInput) -> EvaluatorOutcome {
    let name = evaluator.name();
    let result = panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(input)));

    let checked = match result {
        Ok(Ok(outcome)) => outcome.check_well_formed(name).map(|_| outcome),
        Ok(Err(err)) => Err(err),
        Err(payload) => Err(GateError::evaluator(
            name,
            format!("panicked: {}", panic_message(payload.as_ref())),
        )),
    };

    match checked {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::warn!(evaluator = name, error = %err, "evaluator failed, blocking");
            EvaluatorOutcome::failure(name, err.to_string())
        }
    }
}
