//! Heuristic prompt-injection detector.
//!
//! [`HeuristicDetector`] compiles all enabled patterns into a [`RegexSet`]
//! for O(n) multi-pattern matching, then re-searches with individual
//! [`Regex`]es only for matched patterns to extract spans.

use std::borrow::Cow;
use std::ops::Range;

use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use warden_types::Severity;

use super::patterns::{CustomPattern, InjectionPattern, PatternCategory, builtin_patterns};

/// A built-in or custom injection pattern failed to compile as a regex.
#[derive(Debug, Error)]
#[error("pattern '{pattern_id}' failed to compile: {reason}")]
pub struct PatternCompileError {
    /// The pattern that failed.
    pub pattern_id: String,
    /// Why `regex` rejected it.
    pub reason: String,
}

// ── HeuristicConfig ────────────────────────────────────────────────────

/// Configuration for [`HeuristicDetector`].
///
/// Uses a builder pattern — all setters are `#[must_use]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HeuristicConfig {
    /// Additional user-provided patterns.
    #[serde(default)]
    pub additional_patterns: Vec<CustomPattern>,
    /// Built-in pattern IDs to disable.
    #[serde(default)]
    pub disabled_patterns: Vec<String>,
    /// Whether matching should be case-sensitive (default `false`).
    ///
    /// Note: most built-in patterns already contain `(?i)` flags, so this
    /// only affects patterns that do *not* have an explicit flag.
    #[serde(default)]
    pub case_sensitive: bool,
}

impl HeuristicConfig {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add user-provided patterns.
    #[must_use]
    pub fn additional_patterns(mut self, patterns: Vec<CustomPattern>) -> Self {
        self.additional_patterns = patterns;
        self
    }

    /// Disable built-in patterns by ID.
    #[must_use]
    pub fn disabled_patterns(mut self, ids: Vec<String>) -> Self {
        self.disabled_patterns = ids;
        self
    }

    /// Set case-sensitivity (default `false`).
    #[must_use]
    pub fn case_sensitive(mut self, enabled: bool) -> Self {
        self.case_sensitive = enabled;
        self
    }
}

// ── PatternMatch ───────────────────────────────────────────────────────

/// A single pattern match found by [`HeuristicDetector::detect`].
#[derive(Debug, Clone)]
pub struct PatternMatch {
    /// Which pattern triggered.
    pub pattern_id: Cow<'static, str>,
    /// Category of the matched pattern.
    pub category: PatternCategory,
    /// Byte span of the match in the input text.
    pub matched_span: Range<usize>,
    /// First 50 characters of the matched text (for audit logging).
    pub matched_text: String,
    /// Severity of the matched pattern.
    pub severity: Severity,
    /// Weight for ensemble scoring.
    pub weight: f32,
}

// ── Internal unified pattern entry ─────────────────────────────────────

/// Metadata kept alongside each compiled regex, regardless of whether it
/// originated from a built-in or custom pattern.
#[derive(Debug, Clone)]
struct PatternEntry {
    id: Cow<'static, str>,
    category: PatternCategory,
    severity: Severity,
    weight: f32,
}

// ── HeuristicDetector ──────────────────────────────────────────────────

/// Fast multi-pattern prompt-injection detector.
///
/// Construction compiles a [`RegexSet`] from all enabled patterns for
/// O(n) first-pass scanning.  Only patterns that match are then
/// re-searched with individual [`Regex`]es to extract byte spans.
#[derive(Debug, Clone)]
pub struct HeuristicDetector {
    regex_set: RegexSet,
    individual_regexes: Vec<Regex>,
    patterns: Vec<PatternEntry>,
}

impl HeuristicDetector {
    /// Build a detector from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PatternCompileError`] if any regex pattern fails to
    /// compile.
    pub fn new(config: &HeuristicConfig) -> Result<Self, PatternCompileError> {
        let disabled: std::collections::HashSet<&str> = config
            .disabled_patterns
            .iter()
            .map(String::as_str)
            .collect();

        // Collect enabled built-in patterns.
        let builtins: Vec<InjectionPattern> = builtin_patterns()
            .into_iter()
            .filter(|p| !disabled.contains(p.id.as_ref()))
            .collect();

        // Build unified regex string list + metadata.
        let mut regex_strs: Vec<String> =
            Vec::with_capacity(builtins.len() + config.additional_patterns.len());
        let mut entries: Vec<PatternEntry> = Vec::with_capacity(regex_strs.capacity());

        for p in &builtins {
            regex_strs.push(p.regex_str.to_string());
            entries.push(PatternEntry {
                id: p.id.clone(),
                category: p.category,
                severity: p.severity,
                weight: p.weight,
            });
        }

        for cp in &config.additional_patterns {
            regex_strs.push(cp.regex_str.clone());
            entries.push(PatternEntry {
                id: Cow::Owned(cp.id.clone()),
                category: cp.category,
                severity: cp.severity,
                weight: cp.weight,
            });
        }

        // Compile RegexSet.
        let regex_set = RegexSet::new(&regex_strs).map_err(|e| PatternCompileError {
            pattern_id: "<all>".to_string(),
            reason: format!("failed to compile RegexSet: {e}"),
        })?;

        // Compile individual Regex objects for span extraction.
        let individual_regexes: Vec<Regex> = regex_strs
            .iter()
            .enumerate()
            .map(|(i, rs)| {
                Regex::new(rs).map_err(|e| PatternCompileError {
                    pattern_id: entries[i].id.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            regex_set,
            individual_regexes,
            patterns: entries,
        })
    }

    /// Build a detector with default configuration (all built-in patterns,
    /// no custom patterns, case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`PatternCompileError`] if any built-in pattern fails to
    /// compile.
    pub fn with_defaults() -> Result<Self, PatternCompileError> {
        Self::new(&HeuristicConfig::default())
    }

    /// Scan `text` for injection patterns.
    ///
    /// Uses a two-pass approach:
    /// 1. [`RegexSet::matches`] identifies *which* patterns match (fast).
    /// 2. Individual [`Regex::find`] extracts byte spans for matches only.
    #[must_use]
    pub fn detect(&self, text: &str) -> Vec<PatternMatch> {
        let set_matches = self.regex_set.matches(text);
        let mut results = Vec::new();

        for idx in set_matches {
            if let Some(m) = self.individual_regexes[idx].find(text) {
                let matched_text: String = m.as_str().chars().take(50).collect();

                results.push(PatternMatch {
                    pattern_id: self.patterns[idx].id.clone(),
                    category: self.patterns[idx].category,
                    matched_span: m.start()..m.end(),
                    matched_text,
                    severity: self.patterns[idx].severity,
                    weight: self.patterns[idx].weight,
                });
            }
        }

        results
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
