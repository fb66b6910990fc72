//! Priority resolution of evaluator outcomes
//!
//! Order is fixed: kill switch, then classifier failure, then the
//! BLOCK > REWRITE > EXECUTE merge over effective outcomes. The resolver is
//! total: every combination of inputs maps to exactly one resolution.

use crate::evaluator::{EvaluatorOutcome, Outcome};
use crate::verdict::{reason, Decision, Scope};

/// Verdict fields decided before the trace identity is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub decision: Decision,
    pub scope: Scope,
    pub reason_code: &'static str,
}

impl Resolution {
    pub fn kill_switch() -> Self {
        Self {
            decision: Decision::Terminate,
            scope: Scope::Both,
            reason_code: reason::KILL_SWITCH_ACTIVE,
        }
    }

    pub fn classifier_failure() -> Self {
        Self {
            decision: Decision::Terminate,
            scope: Scope::Both,
            reason_code: reason::CLASSIFIER_FAILURE,
        }
    }

    pub fn engine_failure() -> Self {
        Self {
            decision: Decision::Block,
            scope: Scope::Both,
            reason_code: reason::ENGINE_FAILURE,
        }
    }

    pub fn input_rejected() -> Self {
        Self {
            decision: Decision::Block,
            scope: Scope::Both,
            reason_code: reason::INPUT_CONTRACT_VIOLATION,
        }
    }

    pub fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Execute => Self {
                decision: Decision::Allow,
                scope: Scope::Both,
                reason_code: reason::CONTENT_AND_ACTION_ALLOWED,
            },
            Outcome::Rewrite => Self {
                decision: Decision::Rewrite,
                scope: Scope::Response,
                reason_code: reason::SAFE_REWRITE_REQUIRED,
            },
            Outcome::Block => Self {
                decision: Decision::Block,
                scope: Scope::Both,
                reason_code: reason::POLICY_VIOLATION,
            },
        }
    }
}

/// Strictest effective outcome; an empty set is treated as BLOCK
pub fn merge(outcomes: &[EvaluatorOutcome]) -> Outcome {
    outcomes
        .iter()
        .map(EvaluatorOutcome::effective_outcome)
        .max()
        .unwrap_or(Outcome::Block)
}

/// Resolve a decision once evaluators have run
///
/// `classifier_failed` takes precedence over every evaluator outcome.
pub fn resolve(outcomes: &[EvaluatorOutcome], classifier_failed: bool) -> Resolution {
    if classifier_failed {
        return Resolution::classifier_failure();
    }
    Resolution::from_outcome(merge(outcomes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execute(name: &str) -> EvaluatorOutcome {
        EvaluatorOutcome::execute(name, "ok")
    }

    #[test]
    fn any_block_wins() {
        let mut outcomes: Vec<EvaluatorOutcome> = (0..8).map(|i| execute(&format!("e{}", i))).collect();
        outcomes.push(EvaluatorOutcome::rewrite("r", "soft"));
        outcomes.push(EvaluatorOutcome::block("b", "hard"));
        let resolution = resolve(&outcomes, false);
        assert_eq!(resolution.decision, Decision::Block);
        assert_eq!(resolution.reason_code, reason::POLICY_VIOLATION);
    }

    #[test]
    fn escalated_execute_counts_as_rewrite() {
        let outcomes = vec![execute("a"), execute("b").with_escalation(true)];
        let resolution = resolve(&outcomes, false);
        assert_eq!(resolution.decision, Decision::Rewrite);
        assert_eq!(resolution.scope, Scope::Response);
    }

    #[test]
    fn all_execute_allows_both_surfaces() {
        let outcomes = vec![execute("a"), execute("b")];
        let resolution = resolve(&outcomes, false);
        assert_eq!(resolution.decision, Decision::Allow);
        assert_eq!(resolution.scope, Scope::Both);
    }

    #[test]
    fn classifier_failure_beats_everything() {
        let outcomes = vec![execute("a")];
        assert_eq!(resolve(&outcomes, true), Resolution::classifier_failure());
        let blocked = vec![EvaluatorOutcome::block("b", "hard")];
        assert_eq!(resolve(&blocked, true).decision, Decision::Terminate);
    }

    #[test]
    fn empty_outcome_set_fails_closed() {
        assert_eq!(merge(&[]), Outcome::Block);
    }
}
