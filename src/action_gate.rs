//! Gate for real-world side effects
//!
//! A content verdict alone never authorizes an action. Every outbound action
//! passes the checks below in order and the first failing check blocks it:
//!
//! 1. kill signal among the context risk flags
//! 2. content decision other than ALLOW
//! 3. platform outside the allow list
//! 4. target on the caller-supplied block list
//! 5. per-session action budget exhausted
//!
//! The policy is static and versioned with [`ACTION_GATE_VERSION`].

use crate::errors::GateResult;
use crate::trace_identity::{self, TraceId};
use crate::verdict::Decision;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const ACTION_GATE_VERSION: &str = "ACTION_GATE_V1";

pub const ALLOWED_PLATFORMS: [&str; 2] = ["INSTAGRAM", "WHATSAPP"];

pub const MAX_ACTIONS_PER_SESSION: u32 = 3;

pub const KILL_SIGNALS: [&str; 5] = [
    "SELF_HARM",
    "VIOLENCE",
    "TERROR",
    "CRITICAL_THREAT",
    "ILLEGAL_ACTIVITY",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionContext {
    /// Public label of the content verdict this action follows from
    #[serde(default)]
    pub content_decision: Option<String>,
    #[serde(default)]
    pub risk_flags: Vec<String>,
    #[serde(default)]
    pub blocked_targets: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionHistory {
    #[serde(default)]
    pub actions_sent: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionGateRequest {
    pub action: ActionRequest,
    #[serde(default)]
    pub context: ActionContext,
    #[serde(default)]
    pub history: ActionHistory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionDecision {
    Execute,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionBlock {
    KillSwitch,
    ContentNotApproved,
    PlatformNotAllowed,
    TargetNotAllowed,
    RateLimitExceeded,
}

impl ActionBlock {
    pub fn reason(self) -> &'static str {
        match self {
            ActionBlock::KillSwitch => "KILL_SWITCH_TRIGGERED",
            ActionBlock::ContentNotApproved => "CONTENT_NOT_APPROVED",
            ActionBlock::PlatformNotAllowed => "PLATFORM_NOT_ALLOWED",
            ActionBlock::TargetNotAllowed => "TARGET_NOT_ALLOWED",
            ActionBlock::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
        }
    }

    fn category(self) -> &'static str {
        match self {
            ActionBlock::KillSwitch => "KILL_SWITCH",
            ActionBlock::ContentNotApproved => "CONTENT_BLOCK",
            ActionBlock::PlatformNotAllowed => "PLATFORM_BLOCK",
            ActionBlock::TargetNotAllowed => "TARGET_BLOCK",
            ActionBlock::RateLimitExceeded => "RATE_LIMIT_BLOCK",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionVerdict {
    pub action_decision: ActionDecision,
    pub trace_id: TraceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Serialize)]
struct TraceMaterial<'a> {
    action: &'a ActionRequest,
    context: &'a ActionContext,
    history: &'a ActionHistory,
    category: &'a str,
    engine_version: &'a str,
}

/// First failing check, or `None` when the action may run
pub fn check(request: &ActionGateRequest) -> Option<ActionBlock> {
    let context = &request.context;

    let kill_signal = context
        .risk_flags
        .iter()
        .any(|flag| KILL_SIGNALS.contains(&flag.trim().to_ascii_uppercase().as_str()));
    if kill_signal {
        return Some(ActionBlock::KillSwitch);
    }

    let approved = context
        .content_decision
        .as_deref()
        .and_then(Decision::from_label)
        == Some(Decision::Allow);
    if !approved {
        return Some(ActionBlock::ContentNotApproved);
    }

    let platform = request
        .action
        .platform
        .as_deref()
        .map(|p| p.trim().to_ascii_uppercase());
    match platform {
        Some(p) if ALLOWED_PLATFORMS.contains(&p.as_str()) => {}
        _ => return Some(ActionBlock::PlatformNotAllowed),
    }

    if let Some(target) = request.action.target.as_deref() {
        if context.blocked_targets.iter().any(|blocked| blocked == target) {
            return Some(ActionBlock::TargetNotAllowed);
        }
    }

    if request.history.actions_sent >= MAX_ACTIONS_PER_SESSION {
        return Some(ActionBlock::RateLimitExceeded);
    }

    None
}

pub fn trace(request: &ActionGateRequest, category: &str) -> GateResult<TraceId> {
    trace_identity::compute_material(&TraceMaterial {
        action: &request.action,
        context: &request.context,
        history: &request.history,
        category,
        engine_version: ACTION_GATE_VERSION,
    })
}

/// Approve or block one action. Never fails open.
pub fn approve(request: &ActionGateRequest) -> ActionVerdict {
    let block = check(request);
    let category = block.map(ActionBlock::category).unwrap_or("EXECUTE");
    let trace_id = trace(request, category).unwrap_or_else(|err| {
        tracing::error!(error = %err, "action trace failed");
        trace_identity::compute_lossy(&Value::String(format!("{:?}", request)), category)
    });

    let verdict = match block {
        Some(block) => ActionVerdict {
            action_decision: ActionDecision::Block,
            trace_id,
            reason: Some(block.reason().to_string()),
        },
        None => ActionVerdict {
            action_decision: ActionDecision::Execute,
            trace_id,
            reason: None,
        },
    };
    tracing::info!(
        trace_id = %verdict.trace_id,
        action_decision = ?verdict.action_decision,
        "action gated"
    );
    verdict
}

/// Parse an untyped request and gate it; malformed requests are blocked
pub fn approve_value(request: &Value) -> ActionVerdict {
    match serde_json::from_value::<ActionGateRequest>(request.clone()) {
        Ok(parsed) => approve(&parsed),
        Err(err) => {
            tracing::warn!(error = %err, "action request rejected");
            ActionVerdict {
                action_decision: ActionDecision::Block,
                trace_id: trace_identity::compute_lossy(request, "INVALID_REQUEST"),
                reason: Some("INVALID_REQUEST".to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn approved() -> ActionGateRequest {
        serde_json::from_value(json!({
            "action": { "platform": "instagram", "target": "user-17", "type": "send_message" },
            "context": { "content_decision": "ALLOW", "risk_flags": [], "blocked_targets": ["user-99"] },
            "history": { "actions_sent": 1 }
        }))
        .unwrap()
    }

    #[test]
    fn clean_action_executes() {
        let verdict = approve(&approved());
        assert_eq!(verdict.action_decision, ActionDecision::Execute);
        assert_eq!(verdict.reason, None);
        assert!(verdict.trace_id.is_well_formed());
    }

    #[test]
    fn execute_label_counts_as_approved_content() {
        let mut request = approved();
        request.context.content_decision = Some("EXECUTE".to_string());
        assert_eq!(check(&request), None);
    }

    #[test]
    fn kill_signal_wins_over_everything() {
        let mut request = approved();
        request.context.risk_flags = vec!["self_harm".to_string()];
        request.context.content_decision = Some("BLOCK".to_string());
        request.action.platform = Some("TELEGRAM".to_string());
        assert_eq!(check(&request), Some(ActionBlock::KillSwitch));
    }

    #[test]
    fn checks_run_in_order() {
        let mut request = approved();
        request.context.content_decision = Some("REWRITE".to_string());
        request.action.platform = Some("TELEGRAM".to_string());
        assert_eq!(check(&request), Some(ActionBlock::ContentNotApproved));

        let mut request = approved();
        request.action.platform = None;
        assert_eq!(check(&request), Some(ActionBlock::PlatformNotAllowed));

        let mut request = approved();
        request.action.target = Some("user-99".to_string());
        request.history.actions_sent = 10;
        assert_eq!(check(&request), Some(ActionBlock::TargetNotAllowed));

        let mut request = approved();
        request.history.actions_sent = MAX_ACTIONS_PER_SESSION;
        assert_eq!(check(&request), Some(ActionBlock::RateLimitExceeded));
    }

    #[test]
    fn missing_content_decision_blocks() {
        let mut request = approved();
        request.context.content_decision = None;
        let verdict = approve(&request);
        assert_eq!(verdict.action_decision, ActionDecision::Block);
        assert_eq!(verdict.reason.as_deref(), Some("CONTENT_NOT_APPROVED"));
    }

    #[test]
    fn trace_is_deterministic_and_category_sensitive() {
        let request = approved();
        assert_eq!(approve(&request).trace_id, approve(&request).trace_id);
        assert_ne!(trace(&request, "EXECUTE").unwrap(), trace(&request, "TARGET_BLOCK").unwrap());
    }

    #[test]
    fn malformed_request_is_blocked() {
        let verdict = approve_value(&json!({ "context": {} }));
        assert_eq!(verdict.action_decision, ActionDecision::Block);
        assert_eq!(verdict.reason.as_deref(), Some("INVALID_REQUEST"));
    }
}
