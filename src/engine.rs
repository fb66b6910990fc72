//! Decision engine
//!
//! [`Engine::decide`] is the pure core: it runs the evaluator pipeline and
//! the classifier, resolves the outcomes and derives the trace identity,
//! returning the verdict together with the audit record that describes it.
//! [`Engine::enforce`] wraps it with the last-resort failure path and writes
//! exactly one audit record per call.

use crate::audit_log::{AuditLogger, AuditRecord, ClassifierSummary, EvaluatorSummary};
use crate::behavior_classifier::{BehaviorClassifier, PatternClassifier};
use crate::classifier_adapter::{self, ClassifierAdapter};
use crate::config_loader::{self, GateConfig};
use crate::decision_input::DecisionInput;
use crate::errors::GateResult;
use crate::evaluator::{panic_message, EvaluatorOutcome, EvaluatorPipeline};
use crate::pattern_library::{ContextLists, PatternLibrary};
use crate::resolver::{self, Resolution};
use crate::trace_identity::{self, ENGINE_VERSION};
use crate::verdict::{Decision, FinalVerdict};
use chrono::Utc;
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Static runtime configuration read once at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeSnapshot {
    pub kill_switch: bool,
}

impl RuntimeSnapshot {
    pub fn engaged() -> Self {
        Self { kill_switch: true }
    }
}

/// Verdict plus the record that will be written for it
#[derive(Debug, Clone)]
pub struct Decided {
    pub verdict: FinalVerdict,
    pub record: AuditRecord,
}

#[derive(Clone)]
pub struct Engine {
    pipeline: EvaluatorPipeline,
    classifier: ClassifierAdapter,
    logger: AuditLogger,
    runtime: RuntimeSnapshot,
}

impl Engine {
    pub fn new(pipeline: EvaluatorPipeline, classifier: ClassifierAdapter, logger: AuditLogger) -> Self {
        Self {
            pipeline,
            classifier,
            logger,
            runtime: RuntimeSnapshot::default(),
        }
    }

    /// Standard evaluators and the embedded pattern classifier.
    ///
    /// Fails when the embedded pattern table does not load.
    pub fn builtin(logger: AuditLogger) -> GateResult<Self> {
        let library = PatternLibrary::builtin()?;
        let lists = library.context().clone();
        Ok(Self::with_classifier(Arc::new(PatternClassifier::new(library)), lists, logger))
    }

    pub fn with_classifier(
        classifier: Arc<dyn BehaviorClassifier>,
        lists: ContextLists,
        logger: AuditLogger,
    ) -> Self {
        Self::new(
            EvaluatorPipeline::standard(),
            ClassifierAdapter::new(classifier, lists),
            logger,
        )
    }

    /// Engine wired to the audit backend and kill switch named in `config`
    pub fn from_config(config: &GateConfig) -> GateResult<Self> {
        let sink = config_loader::open_audit_sink(&config.audit)?;
        Ok(Self::builtin(AuditLogger::new(sink))?.with_runtime(config.runtime()))
    }

    pub fn with_runtime(mut self, runtime: RuntimeSnapshot) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn runtime(&self) -> RuntimeSnapshot {
        self.runtime
    }

    pub fn logger(&self) -> &AuditLogger {
        &self.logger
    }

    pub fn evaluator_names(&self) -> Vec<&'static str> {
        let mut names = self.pipeline.names();
        names.push(classifier_adapter::NAME);
        names
    }

    pub fn classifier_version(&self) -> &str {
        self.classifier.classifier_version()
    }

    /// Compute a decision without any side effect
    pub fn decide(&self, input: &DecisionInput, runtime: &RuntimeSnapshot) -> GateResult<Decided> {
        let snapshot = input.snapshot()?;

        if runtime.kill_switch {
            return finish(snapshot, false, Vec::new(), None, Resolution::kill_switch(), true);
        }

        let mut outcomes = self.pipeline.run(input);
        let (classifier_summary, classifier_failed) = match self.classifier.assess(input) {
            Ok(report) => {
                let summary = ClassifierSummary {
                    risk_category: report.verdict.risk_category.as_str().to_string(),
                    confidence: report.verdict.confidence,
                    decision_tier: report.verdict.decision_tier.as_str().to_string(),
                };
                outcomes.push(report.outcome);
                (Some(summary), false)
            }
            Err(failure) => {
                tracing::error!(error = %failure.detail, "behavioral classifier failed, terminating");
                outcomes.push(EvaluatorOutcome::failure(classifier_adapter::NAME, failure.detail));
                (None, true)
            }
        };

        let resolution = resolver::resolve(&outcomes, classifier_failed);
        let mut results: Vec<EvaluatorSummary> = outcomes.iter().map(EvaluatorSummary::from).collect();
        results.sort_by(|a, b| a.name.cmp(&b.name));

        finish(snapshot, false, results, classifier_summary, resolution, false)
    }

    /// Decide on an untyped request; contract violations resolve to BLOCK
    pub fn decide_value(&self, request: &Value, runtime: &RuntimeSnapshot) -> GateResult<Decided> {
        match DecisionInput::from_value(request.clone()) {
            Ok(input) => self.decide(&input, runtime),
            Err(err) => {
                tracing::warn!(error = %err, "decision input rejected");
                let resolution = if runtime.kill_switch {
                    Resolution::kill_switch()
                } else {
                    Resolution::input_rejected()
                };
                finish(request.clone(), true, Vec::new(), None, resolution, runtime.kill_switch)
            }
        }
    }

    /// Decide, record and return the verdict. Never fails.
    pub fn enforce(&self, input: &DecisionInput) -> FinalVerdict {
        let runtime = self.runtime;
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.decide(input, &runtime)));
        let decided = self.recover(result, || input.snapshot().unwrap_or(Value::Null));
        self.commit(decided)
    }

    /// [`Engine::enforce`] for an untyped request
    pub fn enforce_value(&self, request: &Value) -> FinalVerdict {
        let runtime = self.runtime;
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.decide_value(request, &runtime)));
        let decided = self.recover(result, || request.clone());
        self.commit(decided)
    }

    fn recover(
        &self,
        result: std::thread::Result<GateResult<Decided>>,
        snapshot: impl FnOnce() -> Value,
    ) -> Decided {
        let error = match result {
            Ok(Ok(decided)) => return decided,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => format!("engine panicked: {}", panic_message(payload.as_ref())),
        };
        tracing::error!(error = %error, "decision failed, blocking");
        engine_failure(snapshot(), self.runtime.kill_switch)
    }

    fn commit(&self, decided: Decided) -> FinalVerdict {
        self.logger.record(&decided.record);
        tracing::info!(
            trace_id = %decided.verdict.trace_id(),
            decision = %decided.verdict.decision(),
            "decision finalized"
        );
        decided.verdict
    }
}

fn finish(
    snapshot: Value,
    input_rejected: bool,
    evaluator_results: Vec<EvaluatorSummary>,
    classifier: Option<ClassifierSummary>,
    resolution: Resolution,
    kill_switch_engaged: bool,
) -> GateResult<Decided> {
    let trace_id = trace_identity::compute(&snapshot, resolution.decision.label())?;
    let verdict = FinalVerdict::new(resolution.decision, resolution.scope, trace_id.clone(), resolution.reason_code);
    let record = AuditRecord {
        trace_id,
        engine_version: ENGINE_VERSION.to_string(),
        recorded_at: Utc::now(),
        input_snapshot: snapshot,
        input_rejected,
        evaluator_results,
        classifier,
        final_decision: resolution.decision,
        reason_code: resolution.reason_code.to_string(),
        kill_switch_engaged,
    };
    Ok(Decided { verdict, record })
}

fn engine_failure(snapshot: Value, kill_switch_engaged: bool) -> Decided {
    let resolution = Resolution::engine_failure();
    let trace_id = trace_identity::compute_lossy(&snapshot, Decision::Block.label());
    let verdict = FinalVerdict::new(resolution.decision, resolution.scope, trace_id.clone(), resolution.reason_code);
    let record = AuditRecord {
        trace_id,
        engine_version: ENGINE_VERSION.to_string(),
        recorded_at: Utc::now(),
        input_snapshot: snapshot,
        input_rejected: false,
        evaluator_results: Vec::new(),
        classifier: None,
        final_decision: resolution.decision,
        reason_code: resolution.reason_code.to_string(),
        kill_switch_engaged,
    };
    Decided { verdict, record }
}
