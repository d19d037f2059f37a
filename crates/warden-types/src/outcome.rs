//! [`Outcome`] — the single result shape every execution layer returns.
//!
//! `ok=false` must always carry a reason: either a non-empty `violations`
//! list or a non-zero `exit_code`. Nothing downstream drops `violations`;
//! layers that wrap a lower outcome append to the list, they never replace
//! it.

use serde::{Deserialize, Serialize};

use crate::violation::Violation;

/// Stable wire-format result of a `run_python` / `run_shell` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// Whether the action completed without a blocking violation and with
    /// a zero exit code (where an exit code applies).
    pub ok: bool,
    /// Captured standard output, subject to `max_output_bytes` truncation.
    pub stdout: String,
    /// Captured standard error, subject to `max_output_bytes` truncation.
    pub stderr: String,
    /// Process exit code, or `0` for actions with no subprocess.
    pub exit_code: i32,
    /// Wall-clock time spent, in milliseconds.
    pub elapsed_ms: u64,
    /// Set when either stream was cut short by the output cap.
    pub truncated: bool,
    /// Every violation raised while producing this outcome, oldest first.
    pub violations: Vec<Violation>,
}

impl Outcome {
    /// A successful outcome with captured stdout and a zero exit code.
    #[must_use]
    pub fn success(stdout: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            ok: true,
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            elapsed_ms,
            truncated: false,
            violations: Vec::new(),
        }
    }

    /// A refusal: no side effect occurred, `violations` explains why.
    #[must_use]
    pub fn refused(violations: Vec<Violation>) -> Self {
        debug_assert!(!violations.is_empty(), "a refused Outcome must carry a reason");
        Self {
            ok: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            elapsed_ms: 0,
            truncated: false,
            violations,
        }
    }

    /// A completed-but-failed outcome (non-zero exit, or a violation raised
    /// mid-execution such as `TIMEOUT`).
    #[must_use]
    pub fn failed(
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: i32,
        elapsed_ms: u64,
        violations: Vec<Violation>,
    ) -> Self {
        Self {
            ok: false,
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            elapsed_ms,
            truncated: false,
            violations,
        }
    }

    /// Mark the outcome truncated (called by executors once an output cap
    /// is hit).
    #[must_use]
    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    /// Append a violation raised by an outer layer that wraps this outcome,
    /// without discarding the ones already present.
    pub fn push_violation(&mut self, violation: Violation) {
        self.ok = false;
        self.violations.push(violation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violation::{Severity, ViolationKind};

    #[test]
    fn success_round_trips_json() {
        let outcome = Outcome::success("hi\n", 12);
        let json = serde_json::to_string(&outcome).unwrap();
        let restored: Outcome = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.stdout, "hi\n");
        assert!(restored.ok);
    }

    #[test]
    fn refused_is_not_ok() {
        let outcome = Outcome::refused(vec![Violation::new(
            ViolationKind::CommandInjection,
            "blocked",
        )]);
        assert!(!outcome.ok);
        assert_eq!(outcome.violations.len(), 1);
    }

    #[test]
    fn push_violation_flips_ok_to_false() {
        let mut outcome = Outcome::success("x", 1);
        outcome.push_violation(Violation::new(ViolationKind::Timeout, "exceeded budget"));
        assert!(!outcome.ok);
        assert_eq!(outcome.violations[0].severity, Severity::Medium);
    }
}
