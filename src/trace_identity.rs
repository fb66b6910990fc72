//! Deterministic trace identity
//!
//! A trace id is `sha256("{canonical input}|{category}|{ENGINE_VERSION}")`,
//! hex encoded, where the canonical input and the category are both
//! lowercased. No clock, counter or random source participates, so the same
//! triple produces the same id on every machine and after every restart.

use crate::canonicalize::{canonicalize_json, canonicalize_serializable};
use crate::errors::GateResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Version tag baked into every trace id. Bump on any behavioral change.
pub const ENGINE_VERSION: &str = "verdict-gate-1.0.0";

/// Hex length of a trace id
pub const TRACE_ID_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this looks like an id produced by [`compute`]
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == TRACE_ID_LEN
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized serialization fed into the digest
pub fn normalize(input: &Value) -> GateResult<String> {
    Ok(canonicalize_json(input)?.to_lowercase())
}

/// Compute the trace id for an input under a decision category
pub fn compute(input: &Value, category: &str) -> GateResult<TraceId> {
    let normalized = normalize(input)?;
    Ok(compute_from_normalized(&normalized, category))
}

fn compute_from_normalized(normalized: &str, category: &str) -> TraceId {
    let raw = format!(
        "{}|{}|{}",
        normalized,
        category.trim().to_lowercase(),
        ENGINE_VERSION
    );
    let digest = Sha256::digest(raw.as_bytes());
    TraceId(hex::encode(digest))
}

/// Trace id over a structured payload that already carries its own category
/// and version fields
pub fn compute_material<T: Serialize + ?Sized>(material: &T) -> GateResult<TraceId> {
    let canonical = canonicalize_serializable(material)?;
    Ok(TraceId(hex::encode(Sha256::digest(canonical.as_bytes()))))
}

/// Trace id for inputs that cannot even be canonicalized
///
/// Falls back to hashing the debug rendering so a verdict still carries a
/// reproducible id.
pub fn compute_lossy(input: &Value, category: &str) -> TraceId {
    match normalize(input) {
        Ok(normalized) => compute_from_normalized(&normalized, category),
        Err(_) => compute_from_normalized(&format!("{:?}", input).to_lowercase(), category),
    }
}
