use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

use verdict_gate::{
    audit_log::{verify_chain, AuditLogger, AuditSink, JsonlAuditLog},
    audit_store_sled::SledAuditLog,
    decision_input::DecisionInputBuilder,
    engine::{Engine, RuntimeSnapshot},
    replay::{replay_all, replay_record},
    verdict::Decision,
};

fn record_mixed_traffic(engine: &Engine) {
    let requests = vec![
        json!({ "intent": "share a soup recipe", "age_gate": "adult", "region": "in", "platform": "instagram", "karma": 0.9 }),
        json!({ "intent": "you are all I have", "age_gate": "adult", "region": "IN", "platform": "WHATSAPP",
                "signals": { "tone": "Sad", "dependency_score": 0.35, "session_minutes": 47.5 } }),
        json!({ "intent": "  hello  ", "age_gate": "minor", "region": "IN", "platform": "INSTAGRAM" }),
        json!({ "intent": "where can I place bets on the election", "age_gate": "adult", "region": "uk", "platform": "IOS" }),
        json!({ "intent": "hi", "age_gate": "adult", "region": "IN", "platform": "INSTAGRAM",
                "risk_flags": ["Distress", "distress", " guilt_tripping "] }),
        json!({ "intent": "hi", "age_gate": "adult", "karma": 0.123456789012345 }),
        json!({ "age_gate": "adult" }),
        json!("raw text"),
    ];
    for request in &requests {
        engine.enforce_value(request);
    }
}

#[test]
fn jsonl_log_replays_exactly() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(JsonlAuditLog::new(dir.path().join("audit.jsonl")));
    let engine = Engine::builtin(AuditLogger::new(log.clone())).unwrap();
    record_mixed_traffic(&engine);

    // read back from disk through a fresh handle
    let reopened = JsonlAuditLog::new(log.path());
    assert!(verify_chain(&reopened.entries().unwrap()).is_intact());

    let summary = replay_all(&Engine::builtin(AuditLogger::disabled()).unwrap(), &reopened).unwrap();
    assert_eq!(summary.total, 8);
    assert!(summary.is_clean(), "{:?}", summary.mismatched);
}

#[test]
fn sled_log_replays_exactly() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SledAuditLog::open(dir.path().join("audit-db")).unwrap());
    let engine = Engine::builtin(AuditLogger::new(store.clone())).unwrap();
    record_mixed_traffic(&engine);

    let summary = replay_all(&Engine::builtin(AuditLogger::disabled()).unwrap(), store.as_ref()).unwrap();
    assert_eq!(summary.total, 8);
    assert_eq!(summary.matched, 8);
}

#[test]
fn terminated_decisions_replay_under_recorded_kill_switch() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(JsonlAuditLog::new(dir.path().join("audit.jsonl")));
    let engine = Engine::builtin(AuditLogger::new(log.clone()))
        .unwrap()
        .with_runtime(RuntimeSnapshot::engaged());
    record_mixed_traffic(&engine);

    let entries = log.entries().unwrap();
    assert!(entries.iter().all(|e| e.record.final_decision == Decision::Terminate));

    let summary = replay_all(&Engine::builtin(AuditLogger::disabled()).unwrap(), log.as_ref()).unwrap();
    assert!(summary.is_clean());
}

#[test]
fn tampered_record_is_reported_not_accepted() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(JsonlAuditLog::new(dir.path().join("audit.jsonl")));
    let engine = Engine::builtin(AuditLogger::new(log.clone())).unwrap();
    let input = DecisionInputBuilder::new("you are all I have")
        .region("IN")
        .platform("INSTAGRAM")
        .build()
        .unwrap();
    engine.enforce(&input);

    let mut record = log.entries().unwrap().remove(0).record;
    assert_eq!(record.final_decision, Decision::Rewrite);
    record.final_decision = Decision::Allow;

    let report = replay_record(&engine, &record);
    assert!(!report.decision_match);
    assert_eq!(report.replayed_decision, Some(Decision::Rewrite));
}

#[test]
fn torn_log_tail_recovers_and_replays() {
    use std::io::Write;

    let dir = TempDir::new().unwrap();
    let log = Arc::new(JsonlAuditLog::new(dir.path().join("audit.jsonl")));
    let engine = Engine::builtin(AuditLogger::new(log.clone())).unwrap();
    let input = |intent: &str| {
        DecisionInputBuilder::new(intent)
            .region("IN")
            .platform("INSTAGRAM")
            .build()
            .unwrap()
    };
    engine.enforce(&input("share a soup recipe"));

    // a writer that died mid-line
    let mut file = std::fs::OpenOptions::new().append(true).open(log.path()).unwrap();
    file.write_all(br#"{"sequence":1,"record":{"trace"#).unwrap();
    drop(file);

    for n in 0..5 {
        engine.enforce(&input(&format!("message number {}", n)));
    }

    let reopened = JsonlAuditLog::new(log.path());
    let entries = reopened.entries().unwrap();
    assert_eq!(entries.len(), 6);
    assert!(verify_chain(&entries).is_intact());
    assert!(!reopened.fallback_path().exists());

    let summary = replay_all(&Engine::builtin(AuditLogger::disabled()).unwrap(), &reopened).unwrap();
    assert!(summary.is_clean(), "{:?}", summary.mismatched);
}
