//! Per-step critique: a cheap, local check of a step's [`Outcome`] that
//! runs before the step is marked `Completed`, independent of whatever
//! produced the outcome.
//!
//! The Lazy Execution Index flags placeholder output — a step that
//! "succeeded" by emitting a stub (`TODO`, `NotImplementedError`, ...)
//! instead of doing the work. It is a signal, not a correctness proof.

use serde::{Deserialize, Serialize};

use warden_types::Outcome;

/// Patterns in a step's stdout that mark it as unfinished rather than
/// genuinely complete.
const LAZY_PATTERNS: &[&str] = &[
    "TODO",
    "FIXME",
    "HACK",
    "XXX",
    "NotImplementedError",
    "pass  #",
    "... #",
    "raise NotImplementedError",
];

/// Threshold below which a step's Lazy Execution Index is considered
/// acceptable. `lei >= 1.0` fails the critique.
pub const LEI_THRESHOLD: f64 = 1.0;

/// Result of critiquing one completed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Critique {
    /// Whether every sub-check passed.
    pub passed: bool,
    /// 0.0-1.0: did the outcome look complete (non-empty, zero exit)?
    pub completeness_score: f64,
    /// Did the outcome carry no blocking violation and a zero exit code?
    pub validation_passed: bool,
    /// 0.0-1.0: how fast the step ran relative to its budget.
    pub efficiency_score: f64,
    /// Lazy Execution Index — `(lazy_pattern_hits / non_blank_lines) * 1000`.
    pub lei: f64,
    /// Human-readable reasons the critique failed, empty when `passed`.
    pub issues: Vec<String>,
}

impl Critique {
    /// Critique `outcome`, scoring it against the step's `elapsed_ms`.
    #[must_use]
    pub fn of(outcome: &Outcome, elapsed_ms: u64) -> Self {
        let completeness = completeness_score(outcome);
        let validation = outcome.ok && outcome.violations.is_empty();
        let efficiency = efficiency_score(elapsed_ms);
        let lei = lazy_execution_index(&outcome.stdout);

        let passed = completeness > 0.9 && validation && efficiency > 0.7 && lei < LEI_THRESHOLD;

        let mut issues = Vec::new();
        if completeness <= 0.9 {
            issues.push(format!("incomplete result (score: {completeness:.2})"));
        }
        if !validation {
            issues.push("validation failed".to_string());
        }
        if efficiency <= 0.7 {
            issues.push(format!("low efficiency (score: {efficiency:.2})"));
        }
        if lei >= LEI_THRESHOLD {
            issues.push(format!("lazy output detected (lei: {lei:.2}, threshold: {LEI_THRESHOLD})"));
        }

        Self {
            passed,
            completeness_score: completeness,
            validation_passed: validation,
            efficiency_score: efficiency,
            lei,
            issues,
        }
    }
}

fn completeness_score(outcome: &Outcome) -> f64 {
    if !outcome.ok {
        return 0.5;
    }
    if outcome.stdout.is_empty() && outcome.exit_code == 0 {
        return 0.8;
    }
    1.0
}

fn efficiency_score(elapsed_ms: u64) -> f64 {
    match elapsed_ms {
        0..=1_000 => 1.0,
        1_001..=5_000 => 0.8,
        5_001..=10_000 => 0.6,
        _ => 0.4,
    }
}

fn lazy_execution_index(stdout: &str) -> f64 {
    let lazy_count = LAZY_PATTERNS.iter().filter(|p| stdout.contains(**p)).count();
    let total_lines = stdout.lines().filter(|l| !l.trim().is_empty()).count();
    if total_lines == 0 {
        return 0.0;
    }
    (lazy_count as f64 / total_lines as f64) * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_fast_output_passes() {
        let outcome = Outcome::success("line one\nline two\n", 100);
        let critique = Critique::of(&outcome, 100);
        assert!(critique.passed, "{critique:?}");
        assert!(critique.issues.is_empty());
    }

    #[test]
    fn failed_outcome_fails_validation() {
        let outcome = Outcome::failed("", "boom", 1, 50, Vec::new());
        let critique = Critique::of(&outcome, 50);
        assert!(!critique.passed);
        assert!(!critique.validation_passed);
    }

    #[test]
    fn lazy_placeholder_output_fails_lei() {
        let outcome = Outcome::success("raise NotImplementedError\n", 100);
        let critique = Critique::of(&outcome, 100);
        assert!(!critique.passed);
        assert!(critique.lei >= LEI_THRESHOLD);
    }

    #[test]
    fn slow_step_scores_low_efficiency() {
        let outcome = Outcome::success("ok\n", 20_000);
        let critique = Critique::of(&outcome, 20_000);
        assert!(critique.efficiency_score <= 0.5);
    }
}
