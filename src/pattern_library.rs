//! Versioned behavioral pattern tables
//!
//! The tables are policy data kept in `policy/behavior_patterns.toml` and
//! embedded at build time. They are parsed and compiled once per process; a
//! table that fails to load is a fatal startup error, never a silent default.

use crate::behavior_classifier::RiskCategory;
use crate::errors::{GateError, GateResult};
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const BUILTIN_TABLE: &str = include_str!("../policy/behavior_patterns.toml");

lazy_static! {
    static ref BUILTIN: Result<Arc<PatternLibrary>, String> = PatternLibrary::from_toml_str(BUILTIN_TABLE)
        .map(Arc::new)
        .map_err(|e| e.to_string());
}

#[derive(Debug, Deserialize)]
struct RawTable {
    version: String,
    context: RawContext,
    youth_guard: RawYouthGuard,
    #[serde(default)]
    hard_deny: Vec<RawGroup>,
    #[serde(default)]
    soft_rewrite: Vec<RawGroup>,
    templates: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawContext {
    #[serde(default)]
    strict_regions: Vec<String>,
    #[serde(default)]
    conflict_regions: Vec<String>,
    #[serde(default)]
    zero_tolerance_platforms: Vec<String>,
    #[serde(default)]
    minor_protection_platforms: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawYouthGuard {
    indicators: Vec<RawPattern>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    category: String,
    patterns: Vec<RawPattern>,
}

#[derive(Debug, Deserialize)]
struct RawPattern {
    pattern: String,
    weight: f64,
    label: String,
}

/// One compiled pattern with its base confidence weight
#[derive(Debug, Clone)]
pub struct RiskPattern {
    regex: Regex,
    weight: f64,
    label: String,
}

impl RiskPattern {
    fn compile(raw: RawPattern) -> GateResult<Self> {
        if !raw.weight.is_finite() || !(0.0..=100.0).contains(&raw.weight) {
            return Err(GateError::policy(format!(
                "pattern '{}' has weight {} outside [0, 100]",
                raw.label, raw.weight
            )));
        }
        if raw.label.trim().is_empty() {
            return Err(GateError::policy(format!(
                "pattern '{}' has a blank label",
                raw.pattern
            )));
        }
        let regex = RegexBuilder::new(&raw.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| GateError::policy(format!("pattern '{}': {}", raw.label, e)))?;
        Ok(Self {
            regex,
            weight: raw.weight,
            label: raw.label,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Debug, Clone)]
pub struct PatternGroup {
    category: RiskCategory,
    patterns: Vec<RiskPattern>,
}

impl PatternGroup {
    pub fn category(&self) -> RiskCategory {
        self.category
    }

    /// Every pattern in the group that matches, in table order
    pub fn matches<'a>(&'a self, text: &str) -> Vec<&'a RiskPattern> {
        self.patterns.iter().filter(|p| p.is_match(text)).collect()
    }
}

/// Region and platform lists that drive confidence adjustments
#[derive(Debug, Clone, Default)]
pub struct ContextLists {
    pub strict_regions: BTreeSet<String>,
    pub conflict_regions: BTreeSet<String>,
    pub zero_tolerance_platforms: BTreeSet<String>,
    pub minor_protection_platforms: BTreeSet<String>,
}

fn upper_set(values: Vec<String>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_ascii_uppercase())
        .filter(|v| !v.is_empty())
        .collect()
}

#[derive(Debug, Clone)]
pub struct PatternLibrary {
    version: String,
    context: ContextLists,
    youth_indicators: Vec<RiskPattern>,
    hard_deny: Vec<PatternGroup>,
    soft_rewrite: Vec<PatternGroup>,
    templates: BTreeMap<RiskCategory, Vec<String>>,
}

impl PatternLibrary {
    /// Process-wide library compiled from the embedded table
    pub fn builtin() -> GateResult<Arc<PatternLibrary>> {
        match &*BUILTIN {
            Ok(library) => Ok(Arc::clone(library)),
            Err(message) => Err(GateError::policy(message.clone())),
        }
    }

    pub fn from_toml_str(source: &str) -> GateResult<Self> {
        let raw: RawTable = toml::from_str(source)
            .map_err(|e| GateError::policy(format!("unreadable pattern table: {}", e)))?;

        if raw.version.trim().is_empty() {
            return Err(GateError::policy("pattern table version must be set"));
        }
        if raw.youth_guard.indicators.is_empty() {
            return Err(GateError::policy("youth guard needs at least one indicator"));
        }

        let youth_indicators = raw
            .youth_guard
            .indicators
            .into_iter()
            .map(RiskPattern::compile)
            .collect::<GateResult<Vec<_>>>()?;

        let hard_deny = compile_groups(raw.hard_deny, "hard_deny")?;
        let soft_rewrite = compile_groups(raw.soft_rewrite, "soft_rewrite")?;

        let mut seen = BTreeSet::new();
        for group in hard_deny.iter().chain(soft_rewrite.iter()) {
            if !seen.insert(group.category) {
                return Err(GateError::policy(format!(
                    "category {} appears in more than one group",
                    group.category
                )));
            }
        }

        let mut templates = BTreeMap::new();
        for (key, entries) in raw.templates {
            let category = RiskCategory::from_key(&key)
                .ok_or_else(|| GateError::policy(format!("templates for unknown category '{}'", key)))?;
            if entries.is_empty() {
                return Err(GateError::policy(format!("no templates for '{}'", key)));
            }
            templates.insert(category, entries);
        }
        let mut needed = seen;
        needed.insert(RiskCategory::YouthRiskBehavior);
        for category in needed {
            if !templates.contains_key(&category) {
                return Err(GateError::policy(format!(
                    "category {} has no response templates",
                    category
                )));
            }
        }

        let context = ContextLists {
            strict_regions: upper_set(raw.context.strict_regions),
            conflict_regions: upper_set(raw.context.conflict_regions),
            zero_tolerance_platforms: upper_set(raw.context.zero_tolerance_platforms),
            minor_protection_platforms: upper_set(raw.context.minor_protection_platforms),
        };

        Ok(Self {
            version: raw.version,
            context,
            youth_indicators,
            hard_deny,
            soft_rewrite,
            templates,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn context(&self) -> &ContextLists {
        &self.context
    }

    pub fn youth_indicators(&self) -> &[RiskPattern] {
        &self.youth_indicators
    }

    pub fn hard_deny(&self) -> &[PatternGroup] {
        &self.hard_deny
    }

    pub fn soft_rewrite(&self) -> &[PatternGroup] {
        &self.soft_rewrite
    }

    /// Templates for a category; every table category is guaranteed some
    pub fn templates(&self, category: RiskCategory) -> &[String] {
        self.templates
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn compile_groups(groups: Vec<RawGroup>, table: &str) -> GateResult<Vec<PatternGroup>> {
    groups
        .into_iter()
        .map(|group| {
            let category = RiskCategory::from_key(&group.category).ok_or_else(|| {
                GateError::policy(format!("{}: unknown category '{}'", table, group.category))
            })?;
            if category == RiskCategory::Clean {
                return Err(GateError::policy(format!("{}: clean cannot be a risk group", table)));
            }
            if group.patterns.is_empty() {
                return Err(GateError::policy(format!(
                    "{}: group '{}' has no patterns",
                    table, group.category
                )));
            }
            let patterns = group
                .patterns
                .into_iter()
                .map(RiskPattern::compile)
                .collect::<GateResult<Vec<_>>>()?;
            Ok(PatternGroup { category, patterns })
        })
        .collect()
}
