//! Replay of logged decisions against the current build
//!
//! A record is replayed from its input snapshot and kill-switch state alone.
//! The recomputed trace id and decision are compared with the logged ones and
//! every mismatch is reported. Independently of the engine, the logged trace
//! id must also hash from the logged snapshot and logged decision label.

use crate::audit_log::{AuditRecord, AuditSink};
use crate::engine::{Engine, RuntimeSnapshot};
use crate::errors::GateResult;
use crate::trace_identity::{self, TraceId};
use crate::verdict::Decision;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayReport {
    pub trace_id: TraceId,
    pub expected_decision: Decision,
    pub replayed_decision: Option<Decision>,
    pub recomputed_trace_id: Option<TraceId>,
    pub trace_match: bool,
    /// Stored trace id equals `compute(snapshot, logged label)`
    pub label_trace_match: bool,
    pub decision_match: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplayReport {
    pub fn is_match(&self) -> bool {
        self.trace_match && self.label_trace_match && self.decision_match
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplaySummary {
    pub total: usize,
    pub matched: usize,
    pub mismatched: Vec<ReplayReport>,
}

impl ReplaySummary {
    pub fn is_clean(&self) -> bool {
        self.mismatched.is_empty()
    }
}

pub fn replay_record(engine: &Engine, record: &AuditRecord) -> ReplayReport {
    let runtime = RuntimeSnapshot {
        kill_switch: record.kill_switch_engaged,
    };
    let label_trace_match =
        trace_identity::compute(&record.input_snapshot, record.final_decision.label())
            .map(|trace| trace == record.trace_id)
            .unwrap_or(false);
    // rejected inputs go back through the contract path on the raw request
    let result = engine.decide_value(&record.input_snapshot, &runtime);

    match result {
        Ok(decided) => {
            let replayed = decided.verdict.decision();
            let recomputed = decided.verdict.trace_id().clone();
            ReplayReport {
                trace_match: recomputed == record.trace_id,
                label_trace_match,
                decision_match: replayed == record.final_decision,
                trace_id: record.trace_id.clone(),
                expected_decision: record.final_decision,
                replayed_decision: Some(replayed),
                recomputed_trace_id: Some(recomputed),
                error: None,
            }
        }
        Err(err) => ReplayReport {
            trace_id: record.trace_id.clone(),
            expected_decision: record.final_decision,
            replayed_decision: None,
            recomputed_trace_id: None,
            trace_match: false,
            label_trace_match,
            decision_match: false,
            error: Some(err.to_string()),
        },
    }
}

/// Replay every entry of a sink
pub fn replay_all(engine: &Engine, sink: &dyn AuditSink) -> GateResult<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    for entry in sink.entries()? {
        let report = replay_record(engine, &entry.record);
        summary.total += 1;
        if report.is_match() {
            summary.matched += 1;
        } else {
            tracing::warn!(
                sequence = entry.sequence,
                trace_id = %report.trace_id,
                trace_match = report.trace_match,
                label_trace_match = report.label_trace_match,
                decision_match = report.decision_match,
                "replay mismatch"
            );
            summary.mismatched.push(report);
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit_log::{AuditLogger, MemoryAuditLog};
    use crate::decision_input::DecisionInputBuilder;
    use serde_json::json;
    use std::sync::Arc;

    fn engine_with(sink: Arc<MemoryAuditLog>) -> Engine {
        Engine::builtin(AuditLogger::new(sink)).unwrap()
    }

    #[test]
    fn live_decisions_replay_cleanly() {
        let sink = Arc::new(MemoryAuditLog::new());
        let engine = engine_with(sink.clone());

        let clean = DecisionInputBuilder::new("share a soup recipe")
            .region("IN")
            .platform("INSTAGRAM")
            .build()
            .unwrap();
        let dependent = DecisionInputBuilder::new("you are all I have")
            .region("IN")
            .platform("INSTAGRAM")
            .signals(json!({ "tone": "Sad", "dependency_score": 0.35 }))
            .karma(0.72)
            .build()
            .unwrap();
        engine.enforce(&clean);
        engine.enforce(&dependent);
        engine.enforce_value(&json!({ "intent": 42 }));

        let summary = replay_all(&engine, sink.as_ref()).unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.matched, 3);
        assert!(summary.is_clean());
    }

    #[test]
    fn kill_switch_records_replay_with_recorded_state() {
        let sink = Arc::new(MemoryAuditLog::new());
        let engine = engine_with(sink.clone()).with_runtime(RuntimeSnapshot::engaged());
        let input = DecisionInputBuilder::new("hello").region("IN").platform("INSTAGRAM").build().unwrap();
        engine.enforce(&input);

        // replaying engine has the switch off; the record carries it
        let replayer = Engine::builtin(AuditLogger::disabled()).unwrap();
        let summary = replay_all(&replayer, sink.as_ref()).unwrap();
        assert!(summary.is_clean());
    }

    #[test]
    fn altered_decision_is_reported() {
        let sink = Arc::new(MemoryAuditLog::new());
        let engine = engine_with(sink.clone());
        let input = DecisionInputBuilder::new("hello").region("IN").platform("INSTAGRAM").build().unwrap();
        engine.enforce(&input);

        let mut record = sink.entries().unwrap().remove(0).record;
        record.final_decision = Decision::Block;
        let report = replay_record(&engine, &record);
        assert!(!report.decision_match);
        assert!(report.trace_match);
        // the stored id no longer hashes from the edited label
        assert!(!report.label_trace_match);
        assert!(!report.is_match());
    }

    #[test]
    fn logged_trace_hashes_from_logged_label() {
        let sink = Arc::new(MemoryAuditLog::new());
        let engine = engine_with(sink.clone());
        let input = DecisionInputBuilder::new("you are all I have")
            .region("IN")
            .platform("INSTAGRAM")
            .build()
            .unwrap();
        engine.enforce(&input);
        engine.enforce_value(&json!("raw text"));

        for entry in sink.entries().unwrap() {
            let report = replay_record(&engine, &entry.record);
            assert!(report.label_trace_match, "{:?}", report);
            assert!(report.is_match());
        }
    }

    #[test]
    fn swapped_trace_id_fails_label_check() {
        let sink = Arc::new(MemoryAuditLog::new());
        let engine = engine_with(sink.clone());
        let input = DecisionInputBuilder::new("hello").region("IN").platform("INSTAGRAM").build().unwrap();
        engine.enforce(&input);

        let mut record = sink.entries().unwrap().remove(0).record;
        record.trace_id = trace_identity::compute(&record.input_snapshot, "BLOCK").unwrap();
        let report = replay_record(&engine, &record);
        assert!(!report.label_trace_match);
        assert!(!report.trace_match);
        assert!(report.decision_match);
    }

    #[test]
    fn altered_snapshot_is_reported() {
        let sink = Arc::new(MemoryAuditLog::new());
        let engine = engine_with(sink.clone());
        let input = DecisionInputBuilder::new("hello").region("IN").platform("INSTAGRAM").build().unwrap();
        engine.enforce(&input);

        let mut record = sink.entries().unwrap().remove(0).record;
        record.input_snapshot["intent"] = json!("hello!");
        let report = replay_record(&engine, &record);
        assert!(!report.trace_match);
    }
}
