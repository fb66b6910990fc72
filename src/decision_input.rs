//! Validated, immutable input to a single decision
//!
//! Callers hand in a loose [`DecisionRequest`]; [`DecisionInput::try_from`]
//! enforces the input contract and normalizes every field. Normalization is
//! idempotent, so a serialized snapshot parses back into an equal input and
//! replay sees exactly what the live path saw.

use crate::errors::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;

pub const MAX_INTENT_CHARS: usize = 4096;
pub const MAX_RISK_FLAGS: usize = 64;
pub const MAX_FLAG_CHARS: usize = 64;

const DEFAULT_TONE: &str = "neutral";

/// Inbound request shape; every field optional so contract checks can name
/// exactly what is missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub signals: Option<Value>,
    #[serde(default)]
    pub age_gate: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub karma: Option<f64>,
    #[serde(default)]
    pub risk_flags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeGate {
    Adult,
    Minor,
    Unknown,
}

impl AgeGate {
    /// Anything not recognized as an explicit state is `Unknown`
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "adult" | "allowed" | "verified" => AgeGate::Adult,
            "minor" | "blocked" | "underage" => AgeGate::Minor,
            _ => AgeGate::Unknown,
        }
    }

    pub fn is_adult(self) -> bool {
        self == AgeGate::Adult
    }
}

/// Structured emotional/behavioral signals attached to the content
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalBundle {
    tone: String,
    dependency_score: f64,
    vpn_suspected: bool,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl Default for SignalBundle {
    fn default() -> Self {
        Self {
            tone: DEFAULT_TONE.to_string(),
            dependency_score: 0.0,
            vpn_suspected: false,
            extra: BTreeMap::new(),
        }
    }
}

impl SignalBundle {
    pub fn tone(&self) -> &str {
        &self.tone
    }

    pub fn dependency_score(&self) -> f64 {
        self.dependency_score
    }

    pub fn vpn_suspected(&self) -> bool {
        self.vpn_suspected
    }

    /// Signals beyond the known fields, sorted by key
    pub fn extra(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }

    fn from_value(value: Value) -> GateResult<Self> {
        let mut map: Map<String, Value> = match value {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::default()),
            _ => {
                return Err(GateError::input_contract(
                    "signals",
                    "must be a JSON object",
                ))
            }
        };

        let tone = match map.remove("tone") {
            None | Some(Value::Null) => DEFAULT_TONE.to_string(),
            Some(Value::String(tone)) => {
                let tone = tone.trim().to_lowercase();
                if tone.is_empty() {
                    DEFAULT_TONE.to_string()
                } else {
                    tone
                }
            }
            Some(_) => {
                return Err(GateError::input_contract(
                    "signals.tone",
                    "must be a string",
                ))
            }
        };

        let dependency_score = match map.remove("dependency_score") {
            None | Some(Value::Null) => 0.0,
            Some(Value::Number(n)) => {
                let score = n.as_f64().ok_or_else(|| {
                    GateError::input_contract("signals.dependency_score", "not representable")
                })?;
                if !(0.0..=1.0).contains(&score) {
                    return Err(GateError::input_contract(
                        "signals.dependency_score",
                        "must be within [0, 1]",
                    ));
                }
                score
            }
            Some(_) => {
                return Err(GateError::input_contract(
                    "signals.dependency_score",
                    "must be a number",
                ))
            }
        };

        let vpn_suspected = match map.remove("vpn_suspected") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => b,
            Some(_) => {
                return Err(GateError::input_contract(
                    "signals.vpn_suspected",
                    "must be a boolean",
                ))
            }
        };

        Ok(Self {
            tone,
            dependency_score,
            vpn_suspected,
            extra: map.into_iter().collect(),
        })
    }
}

/// Declarative description of one candidate response or action
///
/// Fields are private; once constructed the input is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DecisionRequest")]
pub struct DecisionInput {
    intent: String,
    signals: SignalBundle,
    age_gate: AgeGate,
    region: Option<String>,
    platform: Option<String>,
    karma: Option<f64>,
    risk_flags: BTreeSet<String>,
}

impl DecisionInput {
    pub fn intent(&self) -> &str {
        &self.intent
    }

    pub fn signals(&self) -> &SignalBundle {
        &self.signals
    }

    pub fn age_gate(&self) -> AgeGate {
        self.age_gate
    }

    /// Uppercased region code, `None` when not supplied
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Uppercased platform code, `None` when not supplied
    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn karma(&self) -> Option<f64> {
        self.karma
    }

    pub fn risk_flags(&self) -> &BTreeSet<String> {
        &self.risk_flags
    }

    /// Flags from `flags` that are present, in sorted order
    pub fn matching_flags(&self, flags: &[&str]) -> Vec<String> {
        self.risk_flags
            .iter()
            .filter(|flag| flags.contains(&flag.as_str()))
            .cloned()
            .collect()
    }

    /// JSON snapshot used for trace identity and the audit log
    pub fn snapshot(&self) -> GateResult<Value> {
        serde_json::to_value(self).map_err(|e| GateError::serialization("input snapshot", e))
    }

    pub fn from_value(value: Value) -> GateResult<Self> {
        let request: DecisionRequest = serde_json::from_value(value).map_err(|e| {
            GateError::input_contract("request", format!("malformed request: {}", e))
        })?;
        Self::try_from(request)
    }
}

fn normalize_code(raw: Option<String>) -> Option<String> {
    raw.map(|code| code.trim().to_ascii_uppercase())
        .filter(|code| !code.is_empty())
}

impl TryFrom<DecisionRequest> for DecisionInput {
    type Error = GateError;

    fn try_from(request: DecisionRequest) -> Result<Self, Self::Error> {
        let intent = request
            .intent
            .map(|intent| intent.trim().to_string())
            .filter(|intent| !intent.is_empty())
            .ok_or_else(|| GateError::input_contract("intent", "required and must not be blank"))?;
        if intent.chars().count() > MAX_INTENT_CHARS {
            return Err(GateError::input_contract(
                "intent",
                format!("exceeds {} characters", MAX_INTENT_CHARS),
            ));
        }

        let signals = match request.signals {
            Some(value) => SignalBundle::from_value(value)?,
            None => SignalBundle::default(),
        };

        let age_gate = request
            .age_gate
            .as_deref()
            .map(AgeGate::parse)
            .ok_or_else(|| GateError::input_contract("age_gate", "required"))?;

        if let Some(karma) = request.karma {
            if !karma.is_finite() || !(-1.0..=1.0).contains(&karma) {
                return Err(GateError::input_contract(
                    "karma",
                    "must be a finite number within [-1, 1]",
                ));
            }
        }

        let raw_flags = request.risk_flags.unwrap_or_default();
        if raw_flags.len() > MAX_RISK_FLAGS {
            return Err(GateError::input_contract(
                "risk_flags",
                format!("more than {} flags", MAX_RISK_FLAGS),
            ));
        }
        let mut risk_flags = BTreeSet::new();
        for flag in raw_flags {
            let flag = flag.trim().to_lowercase();
            if flag.is_empty() || flag.chars().count() > MAX_FLAG_CHARS {
                return Err(GateError::input_contract(
                    "risk_flags",
                    "flags must be non-blank and short",
                ));
            }
            risk_flags.insert(flag);
        }

        Ok(Self {
            intent,
            signals,
            age_gate,
            region: normalize_code(request.region),
            platform: normalize_code(request.platform),
            karma: request.karma,
            risk_flags,
        })
    }
}

/// Builder for tests and embedding callers that already hold typed data
#[derive(Debug, Clone, Default)]
pub struct DecisionInputBuilder {
    request: DecisionRequest,
}

impl DecisionInputBuilder {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            request: DecisionRequest {
                intent: Some(intent.into()),
                age_gate: Some("adult".to_string()),
                ..DecisionRequest::default()
            },
        }
    }

    pub fn age_gate(mut self, age_gate: impl Into<String>) -> Self {
        self.request.age_gate = Some(age_gate.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.request.region = Some(region.into());
        self
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.request.platform = Some(platform.into());
        self
    }

    pub fn karma(mut self, karma: f64) -> Self {
        self.request.karma = Some(karma);
        self
    }

    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.request
            .risk_flags
            .get_or_insert_with(Vec::new)
            .push(flag.into());
        self
    }

    pub fn signals(mut self, signals: Value) -> Self {
        self.request.signals = Some(signals);
        self
    }

    pub fn build(self) -> GateResult<DecisionInput> {
        DecisionInput::try_from(self.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_request() -> Value {
        json!({
            "intent": "  Tell me a story  ",
            "signals": { "tone": " Warm ", "dependency_score": 0.4, "mood": "calm" },
            "age_gate": "ALLOWED",
            "region": "in",
            "platform": " instagram ",
            "karma": 0.7,
            "risk_flags": ["Distress", "distress", " aggression "]
        })
    }

    #[test]
    fn normalizes_fields() {
        let input = DecisionInput::from_value(full_request()).unwrap();
        assert_eq!(input.intent(), "Tell me a story");
        assert_eq!(input.signals().tone(), "warm");
        assert_eq!(input.signals().dependency_score(), 0.4);
        assert_eq!(input.signals().extra().get("mood"), Some(&json!("calm")));
        assert_eq!(input.age_gate(), AgeGate::Adult);
        assert_eq!(input.region(), Some("IN"));
        assert_eq!(input.platform(), Some("INSTAGRAM"));
        assert_eq!(input.karma(), Some(0.7));
        let flags: Vec<&str> = input.risk_flags().iter().map(String::as_str).collect();
        assert_eq!(flags, vec!["aggression", "distress"]);
    }

    #[test]
    fn snapshot_round_trip_is_identity() {
        let input = DecisionInput::from_value(full_request()).unwrap();
        let snapshot = input.snapshot().unwrap();
        let reparsed: DecisionInput = serde_json::from_value(snapshot.clone()).unwrap();
        assert_eq!(reparsed, input);
        assert_eq!(reparsed.snapshot().unwrap(), snapshot);
    }

    #[test]
    fn missing_intent_is_rejected() {
        let err = DecisionInput::from_value(json!({ "age_gate": "adult" })).unwrap_err();
        assert!(matches!(err, GateError::InputContract { ref field, .. } if field == "intent"));
    }

    #[test]
    fn missing_age_gate_is_rejected() {
        let err = DecisionInput::from_value(json!({ "intent": "hi" })).unwrap_err();
        assert!(matches!(err, GateError::InputContract { ref field, .. } if field == "age_gate"));
    }

    #[test]
    fn unrecognized_age_gate_is_unknown() {
        assert_eq!(AgeGate::parse("maybe"), AgeGate::Unknown);
        assert_eq!(AgeGate::parse("BLOCKED"), AgeGate::Minor);
        assert_eq!(AgeGate::parse("verified"), AgeGate::Adult);
    }

    #[test]
    fn out_of_range_karma_is_rejected() {
        let err = DecisionInputBuilder::new("hi").karma(3.0).build().unwrap_err();
        assert!(matches!(err, GateError::InputContract { ref field, .. } if field == "karma"));
    }

    #[test]
    fn dependency_score_bounds_are_enforced() {
        let err = DecisionInputBuilder::new("hi")
            .signals(json!({ "dependency_score": 1.5 }))
            .build()
            .unwrap_err();
        assert!(matches!(err, GateError::InputContract { .. }));
    }

    #[test]
    fn wrong_field_type_is_rejected() {
        let err = DecisionInput::from_value(json!({ "intent": 5, "age_gate": "adult" })).unwrap_err();
        assert!(matches!(err, GateError::InputContract { .. }));
    }

    #[test]
    fn blank_flag_is_rejected() {
        let err = DecisionInputBuilder::new("hi").flag("  ").build().unwrap_err();
        assert!(matches!(err, GateError::InputContract { ref field, .. } if field == "risk_flags"));
    }

    #[test]
    fn blank_region_means_missing() {
        let input = DecisionInputBuilder::new("hi").region("   ").build().unwrap();
        assert_eq!(input.region(), None);
    }
}
