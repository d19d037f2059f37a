//! The typed violation vocabulary shared by every layer of the core.
//!
//! Every refusal — whether raised by the [`Validator`](../index.html), the
//! AST analyzer, a sandboxed execution, or the workflow engine — is reported
//! as a [`Violation`] rather than an ambient exception. Callers match on
//! [`ViolationKind`]; nothing here is ever widened into a generic "error
//! string".

use serde::{Deserialize, Serialize};

/// Severity assigned to a single [`Violation`].
///
/// `Ord` is derived so callers can compare severities directly
/// (`severity >= Severity::High`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Low risk — logged, rarely actioned on its own.
    Low,
    /// Medium risk — warrants investigation.
    Medium,
    /// High risk — blocks in most policies.
    High,
    /// Critical — always blocks; always audited.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Ordinal threat level assigned to a [`crate::ValidationResult`].
///
/// `None` is spelled `Unthreatening` at the type level so it doesn't
/// collide with [`Option::None`]; it still serializes as `"none"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    /// No violations and no warnings.
    #[default]
    #[serde(rename = "none")]
    Unthreatening,
    /// Only warnings fired (semantic or whitelist layer, in permissive mode).
    Medium,
    /// SQL/prompt injection or another error-producing sub-check fired.
    High,
    /// Command injection or path traversal was blocked.
    Critical,
}

/// The fixed vocabulary of things the core refuses or fails on.
///
/// Closed by design: new kinds are a breaking change, not a config value,
/// because every layer above (audit sinks, CLI exit-code mapping, test
/// assertions) matches on this set exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    // ── Validation errors ──
    /// Shell metacharacter sequence, piping to an interpreter, or a
    /// known-destructive command shape (`rm -rf /`, fork bomb, ...).
    CommandInjection,
    /// `..` traversal, absolute escape, or symlink escape of a declared base.
    PathTraversal,
    /// NUL byte found in an input that forbids it.
    NullByte,
    /// CR/LF found in a filename/identifier/argument context.
    NewlineInjection,
    /// Zero-width, bidi-override, or homoglyph character detected.
    UnicodeAttack,
    /// SQL-injection heuristic fired on a SQL-typed input.
    SqlInjection,
    /// Prompt-injection heuristic fired (role-switch tokens, "ignore
    /// previous instructions", system-prompt extraction attempts).
    PromptInjection,
    /// Input exceeded the configured per-kind length cap before it ever
    /// reached an executor.
    InputTooLarge,
    /// Value doesn't have the shape a Python identifier requires (bad
    /// leading character, embedded non-alphanumerics, ...).
    InvalidIdentifier,

    // ── Analysis errors (AST Analyzer) ──
    /// A top-level import is blocklisted, or absent from the allowlist.
    BlockedImport,
    /// A bare-name call targets a blocklisted builtin (`eval`, `exec`, ...).
    BlockedBuiltin,
    /// The AST exceeded the configured depth or node-count bound.
    AstDepth,
    /// A `while true` loop has no statically reachable `break`.
    InfiniteLoop,

    // ── Execution errors (Sandbox / ShellExec) ──
    /// Captured output exceeded `max_output_bytes`.
    OutputLimit,
    /// Wall-clock budget exceeded; the action was terminated.
    Timeout,
    /// The child process exceeded its memory rlimit.
    MemoryLimit,
    /// The child's result channel was empty after the wait deadline.
    SandboxEscape,

    // ── Workflow errors (Workflow Engine) ──
    /// The declared dependency graph contains a cycle.
    Cycle,
    /// A step named a tool the caller's registry doesn't recognize.
    UnknownTool,
    /// Checkpoint creation failed before a risky step could run.
    CheckpointFailed,
    /// Rollback restored some but not all backed-up files.
    PartialRollback,
}

impl ViolationKind {
    /// The severity this kind carries when no finer-grained context is
    /// available. Call sites that know more (e.g. the Validator's
    /// threat-level assignment) may still choose a different severity for
    /// the [`Violation`] they construct.
    #[must_use]
    pub fn default_severity(self) -> Severity {
        use ViolationKind::{
            AstDepth, BlockedBuiltin, BlockedImport, CheckpointFailed, CommandInjection, Cycle,
            InfiniteLoop, InputTooLarge, InvalidIdentifier, MemoryLimit, NewlineInjection,
            NullByte, OutputLimit, PartialRollback, PathTraversal, PromptInjection, SandboxEscape,
            SqlInjection, Timeout, UnicodeAttack, UnknownTool,
        };
        match self {
            CommandInjection | PathTraversal | SandboxEscape | Cycle => Severity::Critical,
            SqlInjection | PromptInjection | BlockedImport | BlockedBuiltin | MemoryLimit
            | PartialRollback | CheckpointFailed | InputTooLarge => Severity::High,
            NullByte | NewlineInjection | UnicodeAttack | AstDepth | InfiniteLoop
            | OutputLimit | Timeout | UnknownTool | InvalidIdentifier => Severity::Medium,
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // `Serialize` already renders SCREAMING_SNAKE_CASE; reuse it so the
        // wire format and the `Display` impl never drift apart.
        let json = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", json.trim_matches('"'))
    }
}

/// A single refusal or failure, carrying enough context to audit and to
/// explain to a user without echoing the raw attacker payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// What went wrong.
    pub kind: ViolationKind,
    /// Human-readable explanation. MUST NOT contain the raw input that
    /// triggered the violation — name the kind, not the payload.
    pub message: String,
    /// Severity of this specific violation.
    pub severity: Severity,
}

impl Violation {
    /// Construct a violation using `kind`'s default severity.
    #[must_use]
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            severity: kind.default_severity(),
        }
    }

    /// Construct a violation with an explicit severity override.
    #[must_use]
    pub fn with_severity(kind: ViolationKind, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            kind,
            message: message.into(),
            severity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn threat_level_ordering() {
        assert!(ThreatLevel::Unthreatening < ThreatLevel::Medium);
        assert!(ThreatLevel::Medium < ThreatLevel::High);
        assert!(ThreatLevel::High < ThreatLevel::Critical);
    }

    #[test]
    fn violation_kind_wire_format() {
        let json = serde_json::to_string(&ViolationKind::CommandInjection).unwrap();
        assert_eq!(json, "\"COMMAND_INJECTION\"");
        assert_eq!(ViolationKind::CommandInjection.to_string(), "COMMAND_INJECTION");
    }

    #[test]
    fn threat_level_none_serializes_lowercase() {
        let json = serde_json::to_string(&ThreatLevel::Unthreatening).unwrap();
        assert_eq!(json, "\"none\"");
    }

    #[test]
    fn command_injection_is_critical_by_default() {
        let v = Violation::new(ViolationKind::CommandInjection, "blocked rm -rf /");
        assert_eq!(v.severity, Severity::Critical);
    }
}
