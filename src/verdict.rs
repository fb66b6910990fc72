//! The engine's only externally authoritative output

use crate::evaluator::Outcome;
use crate::trace_identity::TraceId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The single rewrite class handed to downstream rewriters
pub const REWRITE_CLASS: &str = "safe_completion_v1";

pub mod reason {
    pub const CONTENT_AND_ACTION_ALLOWED: &str = "content_and_action_allowed";
    pub const SAFE_REWRITE_REQUIRED: &str = "safe_rewrite_required";
    pub const POLICY_VIOLATION: &str = "policy_violation";
    pub const KILL_SWITCH_ACTIVE: &str = "kill_switch_active";
    pub const CLASSIFIER_FAILURE: &str = "classifier_failure";
    pub const ENGINE_FAILURE: &str = "engine_failure";
    pub const INPUT_CONTRACT_VIOLATION: &str = "input_contract_violation";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Allow,
    Rewrite,
    Block,
    Terminate,
}

impl Decision {
    /// Public label; also the trace category
    pub fn label(self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::Rewrite => "REWRITE",
            Decision::Block => "BLOCK",
            Decision::Terminate => "TERMINATE",
        }
    }

    /// Accepts the public labels plus the internal `EXECUTE` spelling
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "ALLOW" | "EXECUTE" => Some(Decision::Allow),
            "REWRITE" => Some(Decision::Rewrite),
            "BLOCK" => Some(Decision::Block),
            "TERMINATE" => Some(Decision::Terminate),
            _ => None,
        }
    }

    pub fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Execute => Decision::Allow,
            Outcome::Rewrite => Decision::Rewrite,
            Outcome::Block => Decision::Block,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Response,
    Action,
    Both,
}

/// Immutable verdict; fields are only readable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalVerdict {
    decision: Decision,
    scope: Scope,
    trace_id: TraceId,
    reason_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rewrite_class: Option<String>,
}

impl FinalVerdict {
    /// The rewrite class is attached exactly when the decision is REWRITE
    pub fn new(decision: Decision, scope: Scope, trace_id: TraceId, reason_code: &str) -> Self {
        let rewrite_class = match decision {
            Decision::Rewrite => Some(REWRITE_CLASS.to_string()),
            _ => None,
        };
        Self {
            decision,
            scope,
            trace_id,
            reason_code: reason_code.to_string(),
            rewrite_class,
        }
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    pub fn reason_code(&self) -> &str {
        &self.reason_code
    }

    pub fn rewrite_class(&self) -> Option<&str> {
        self.rewrite_class.as_deref()
    }

    /// Minimal shape allowed across the caller boundary
    pub fn public(&self) -> PublicVerdict {
        PublicVerdict {
            decision: self.decision,
            trace_id: self.trace_id.clone(),
            rewrite_class: self.rewrite_class.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicVerdict {
    pub decision: Decision,
    pub trace_id: TraceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite_class: Option<String>,
}
