//! Behavioral risk classifier
//!
//! Matches serialized content against the versioned pattern tables and
//! produces a [`ClassifierVerdict`] with a deterministic confidence score.
//!
//! Evaluation order:
//! 1. youth guard (only when the subject is not a verified adult)
//! 2. HARD_DENY groups, first group with any hit wins
//! 3. SOFT_REWRITE groups, first group with any hit wins
//! 4. otherwise ALLOW / clean with confidence 0
//!
//! Pattern evaluation is pure and total; it never fails on any text.

use crate::errors::{GateError, GateResult};
use crate::pattern_library::{PatternGroup, PatternLibrary, RiskPattern};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    IllegalIntentProbing,
    SexualEscalationAttempt,
    YouthRiskBehavior,
    EmotionalDependencyBait,
    LonelinessHook,
    ManipulativePhrasing,
    RegionPlatformConflict,
    Clean,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 8] = [
        RiskCategory::IllegalIntentProbing,
        RiskCategory::SexualEscalationAttempt,
        RiskCategory::YouthRiskBehavior,
        RiskCategory::EmotionalDependencyBait,
        RiskCategory::LonelinessHook,
        RiskCategory::ManipulativePhrasing,
        RiskCategory::RegionPlatformConflict,
        RiskCategory::Clean,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RiskCategory::IllegalIntentProbing => "illegal_intent_probing",
            RiskCategory::SexualEscalationAttempt => "sexual_escalation_attempt",
            RiskCategory::YouthRiskBehavior => "youth_risk_behavior",
            RiskCategory::EmotionalDependencyBait => "emotional_dependency_bait",
            RiskCategory::LonelinessHook => "loneliness_hook",
            RiskCategory::ManipulativePhrasing => "manipulative_phrasing",
            RiskCategory::RegionPlatformConflict => "region_platform_conflict",
            RiskCategory::Clean => "clean",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL.iter().copied().find(|c| c.as_str() == key)
    }

    pub fn reason_code(self) -> &'static str {
        match self {
            RiskCategory::IllegalIntentProbing => "illegal_intent_detected",
            RiskCategory::SexualEscalationAttempt => "sexual_escalation_detected",
            RiskCategory::YouthRiskBehavior => "youth_exploitation_detected",
            RiskCategory::EmotionalDependencyBait => "emotional_dependency_detected",
            RiskCategory::LonelinessHook => "loneliness_exploit_detected",
            RiskCategory::ManipulativePhrasing => "manipulative_language_detected",
            RiskCategory::RegionPlatformConflict => "region_violation_detected",
            RiskCategory::Clean => "clean_content",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionTier {
    Allow,
    SoftRewrite,
    HardDeny,
}

impl DecisionTier {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionTier::Allow => "ALLOW",
            DecisionTier::SoftRewrite => "SOFT_REWRITE",
            DecisionTier::HardDeny => "HARD_DENY",
        }
    }
}

/// Contextual modifiers applied on top of pattern confidence
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierContext {
    pub adult: bool,
    /// Region enforces strict mode
    pub strict_mode: bool,
    /// Region is on the region-conflict list
    pub restricted_region: bool,
    pub zero_tolerance: bool,
    pub minor_protection: bool,
    /// Trust bias in [0, 1]; 0.5 is neutral
    pub karma_bias: f64,
}

impl Default for ClassifierContext {
    fn default() -> Self {
        Self {
            adult: false,
            strict_mode: false,
            restricted_region: false,
            zero_tolerance: false,
            minor_protection: false,
            karma_bias: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    pub decision_tier: DecisionTier,
    pub risk_category: RiskCategory,
    pub confidence: f64,
    pub reason_code: String,
    pub evidence: Vec<String>,
    pub safe_output: String,
}

impl ClassifierVerdict {
    /// Shape check applied before a verdict is trusted
    pub fn validate(&self) -> GateResult<()> {
        if !self.confidence.is_finite() || !(0.0..=100.0).contains(&self.confidence) {
            return Err(GateError::classifier(format!(
                "confidence {} outside [0, 100]",
                self.confidence
            )));
        }
        let clean = self.risk_category == RiskCategory::Clean;
        let allow = self.decision_tier == DecisionTier::Allow;
        if clean != allow {
            return Err(GateError::classifier(
                "clean category and ALLOW tier must coincide",
            ));
        }
        if clean && self.confidence != 0.0 {
            return Err(GateError::classifier("clean verdict must carry confidence 0"));
        }
        if !clean && self.evidence.is_empty() {
            return Err(GateError::classifier("risk verdict without evidence"));
        }
        if self.reason_code.trim().is_empty() {
            return Err(GateError::classifier("blank reason code"));
        }
        Ok(())
    }
}

/// Seam for the secondary risk classifier
pub trait BehaviorClassifier: Send + Sync {
    fn version(&self) -> &str;

    fn classify(&self, text: &str, context: &ClassifierContext) -> GateResult<ClassifierVerdict>;
}

/// Regex/confidence classifier over a [`PatternLibrary`]
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    library: Arc<PatternLibrary>,
}

impl PatternClassifier {
    pub fn new(library: Arc<PatternLibrary>) -> Self {
        Self { library }
    }

    pub fn builtin() -> GateResult<Self> {
        Ok(Self::new(PatternLibrary::builtin()?))
    }

    pub fn library(&self) -> &Arc<PatternLibrary> {
        &self.library
    }

    /// Total classification; never fails
    pub fn evaluate(&self, text: &str, context: &ClassifierContext) -> ClassifierVerdict {
        if !context.adult {
            let hits: Vec<&RiskPattern> = self
                .library
                .youth_indicators()
                .iter()
                .filter(|p| p.is_match(text))
                .collect();
            if !hits.is_empty() {
                return self.verdict(
                    DecisionTier::HardDeny,
                    RiskCategory::YouthRiskBehavior,
                    &hits,
                    text,
                    context,
                );
            }
        }

        if let Some((category, hits)) = first_hit(self.library.hard_deny(), text) {
            return self.verdict(DecisionTier::HardDeny, category, &hits, text, context);
        }

        if let Some((category, hits)) = first_hit(self.library.soft_rewrite(), text) {
            return self.verdict(DecisionTier::SoftRewrite, category, &hits, text, context);
        }

        ClassifierVerdict {
            decision_tier: DecisionTier::Allow,
            risk_category: RiskCategory::Clean,
            confidence: 0.0,
            reason_code: RiskCategory::Clean.reason_code().to_string(),
            evidence: Vec::new(),
            safe_output: text.to_string(),
        }
    }

    fn verdict(
        &self,
        tier: DecisionTier,
        category: RiskCategory,
        hits: &[&RiskPattern],
        text: &str,
        context: &ClassifierContext,
    ) -> ClassifierVerdict {
        let weights: Vec<f64> = hits.iter().map(|p| p.weight()).collect();
        let base = base_confidence(&weights, text);
        ClassifierVerdict {
            decision_tier: tier,
            risk_category: category,
            confidence: adjust_for_context(base, category, context),
            reason_code: category.reason_code().to_string(),
            evidence: hits.iter().map(|p| p.label().to_string()).collect(),
            safe_output: select_template(self.library.templates(category), text, category),
        }
    }
}

impl BehaviorClassifier for PatternClassifier {
    fn version(&self) -> &str {
        self.library.version()
    }

    fn classify(&self, text: &str, context: &ClassifierContext) -> GateResult<ClassifierVerdict> {
        Ok(self.evaluate(text, context))
    }
}

fn first_hit<'a>(
    groups: &'a [PatternGroup],
    text: &str,
) -> Option<(RiskCategory, Vec<&'a RiskPattern>)> {
    groups.iter().find_map(|group| {
        let hits = group.matches(text);
        if hits.is_empty() {
            None
        } else {
            Some((group.category(), hits))
        }
    })
}

/// Pattern-level confidence before context adjustments
pub fn base_confidence(weights: &[f64], text: &str) -> f64 {
    if weights.is_empty() {
        return 0.0;
    }
    let mut confidence = weights.iter().sum::<f64>() / weights.len() as f64;
    if weights.len() > 1 {
        confidence += (2.0 * (weights.len() - 1) as f64).min(10.0);
    }

    let words = text.split_whitespace().count();
    if words > 20 {
        confidence *= 1.05;
    } else if words < 5 {
        confidence *= 0.9;
    }

    let exclamations = text.matches('!').count();
    let questions = text.matches('?').count();
    if exclamations > 2 || questions > 3 {
        confidence *= 1.08;
    }

    confidence
}

/// Karma factor maps bias 0.0 → 0.8, 0.5 → 1.0, 1.0 → 1.2
pub fn karma_factor(bias: f64) -> f64 {
    let bias = if bias.is_finite() { bias.clamp(0.0, 1.0) } else { 0.5 };
    0.8 + bias * 0.4
}

pub fn adjust_for_context(base: f64, category: RiskCategory, context: &ClassifierContext) -> f64 {
    let mut confidence = base * karma_factor(context.karma_bias);

    if context.strict_mode {
        confidence *= 1.15;
    }
    if context.restricted_region && category == RiskCategory::RegionPlatformConflict {
        confidence *= 1.25;
    }
    if context.zero_tolerance {
        confidence *= 1.2;
    }
    if context.minor_protection && category == RiskCategory::YouthRiskBehavior {
        confidence *= 1.3;
    }

    if confidence.is_finite() {
        confidence.clamp(0.0, 100.0)
    } else {
        100.0
    }
}

/// Deterministic template choice: sha256("{text}:{category}") mod count
pub fn select_template(templates: &[String], text: &str, category: RiskCategory) -> String {
    if templates.is_empty() {
        return "I need to keep our conversation appropriate and safe.".to_string();
    }
    let digest = Sha256::digest(format!("{}:{}", text, category.as_str()).as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let index = (u64::from_be_bytes(prefix) % templates.len() as u64) as usize;
    templates[index].clone()
}
