use crate::audit_log::AuditLogger;
use crate::behavior_classifier::PatternClassifier;
use crate::classifier_adapter::ClassifierAdapter;
use crate::decision_input::{DecisionInput, DecisionInputBuilder};
use crate::engine::{Engine, RuntimeSnapshot};
use crate::errors::{GateError, GateResult};
use crate::evaluator::{Evaluator, EvaluatorOutcome, EvaluatorPipeline, EVALUATOR_FAILURE};
use crate::evaluators::standard_set;
use crate::pattern_library::PatternLibrary;
use crate::verdict::{reason, Decision};
use std::sync::Arc;

struct Unreachable;

impl Evaluator for Unreachable {
    fn name(&self) -> &'static str {
        "reputation_lookup"
    }

    fn evaluate(&self, _input: &DecisionInput) -> GateResult<EvaluatorOutcome> {
        Err(GateError::evaluator("reputation_lookup", "upstream timed out"))
    }
}

struct Panicking;

impl Evaluator for Panicking {
    fn name(&self) -> &'static str {
        "sentiment_check"
    }

    fn evaluate(&self, _input: &DecisionInput) -> GateResult<EvaluatorOutcome> {
        let scores: Vec<f64> = Vec::new();
        Ok(EvaluatorOutcome::execute("sentiment_check", &format!("{}", scores[3])))
    }
}

fn engine_with(extra: Arc<dyn Evaluator>) -> Engine {
    let library = PatternLibrary::builtin().unwrap();
    let lists = library.context().clone();
    let mut evaluators = standard_set();
    evaluators.push(extra);
    Engine::new(
        EvaluatorPipeline::new(evaluators),
        ClassifierAdapter::new(Arc::new(PatternClassifier::new(library)), lists),
        AuditLogger::disabled(),
    )
}

fn clean_input() -> DecisionInput {
    DecisionInputBuilder::new("what is a good name for a cat")
        .region("IN")
        .platform("WHATSAPP")
        .karma(1.0)
        .build()
        .unwrap()
}

#[test]
fn erroring_evaluator_cannot_be_outvoted() {
    let engine = engine_with(Arc::new(Unreachable));
    let decided = engine.decide(&clean_input(), &RuntimeSnapshot::default()).unwrap();

    assert_eq!(decided.verdict.decision(), Decision::Block);
    assert_eq!(decided.verdict.reason_code(), reason::POLICY_VIOLATION);

    let failed = decided
        .record
        .evaluator_results
        .iter()
        .find(|r| r.name == "reputation_lookup")
        .unwrap();
    assert_eq!(failed.reason_code, EVALUATOR_FAILURE);
    assert!(failed.escalation);
}

#[test]
fn panicking_evaluator_fails_closed() {
    let engine = engine_with(Arc::new(Panicking));
    let verdict = engine.enforce(&clean_input());
    assert_eq!(verdict.decision(), Decision::Block);
}

#[test]
fn kill_switch_still_beats_a_failing_evaluator() {
    let engine = engine_with(Arc::new(Unreachable)).with_runtime(RuntimeSnapshot::engaged());
    assert_eq!(engine.enforce(&clean_input()).decision(), Decision::Terminate);
}
