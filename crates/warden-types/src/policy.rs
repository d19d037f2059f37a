//! [`SandboxPolicy`] — the single configuration surface consumed at
//! start-up. Every budget and allow/block list the Sandbox, ShellExec, and
//! AST Analyzer consult lives here so the three components can never drift
//! out of sync on what "STRICT" means.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Ordered sandboxing strictness. `Ord` is derived so call sites can write
/// `level >= PolicyLevel::Strict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyLevel {
    /// Fewest restrictions; in-process execution, generous budgets.
    #[default]
    Minimal,
    /// In-process execution with standard budgets.
    Standard,
    /// Isolated child process by default; implementers may still expose an
    /// in-process escape hatch, but subprocess is the default.
    Strict,
    /// Isolated child process, tightest budgets.
    Paranoid,
}

impl PolicyLevel {
    /// The in-process/subprocess boundary sits at `level >= Strict`, with
    /// subprocess the default at `Strict` itself.
    #[must_use]
    pub fn requires_subprocess(self) -> bool {
        self >= PolicyLevel::Strict
    }
}

/// Exponential backoff configuration for the Shell Executor's retry layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub base_delay_ms: u64,
    /// Ceiling applied to the exponential backoff.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

/// The full policy surface for the Sandbox, ShellExec, and AST Analyzer.
///
/// Loaded once at start-up via `warden_core::config`; never mutated
/// per-call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SandboxPolicy {
    /// Sandboxing strictness; also gates in-process vs subprocess execution.
    pub level: PolicyLevel,
    /// Hard wall-clock budget per action, in milliseconds.
    pub max_wall_ms: u64,
    /// Per-action CPU time budget in milliseconds (rounded up to whole
    /// seconds for the child's rlimit).
    pub max_cpu_ms: u64,
    /// Address-space rlimit for a sandboxed child, in bytes.
    pub max_memory_bytes: u64,
    /// Cap on captured stdout+stderr, in bytes, before truncation.
    pub max_output_bytes: u64,
    /// AST walk depth bound.
    pub max_ast_depth: u32,
    /// Loop-iteration budget used by the bounded interpreter / loop guard.
    pub max_loop_iters: u64,
    /// Top-level modules the SafeEnv import gate allows.
    pub allow_imports: HashSet<String>,
    /// Top-level modules the SafeEnv import gate always rejects. Wins over
    /// `allow_imports` on conflict.
    pub blocked_imports: HashSet<String>,
    /// Builtins the SafeEnv exposes.
    pub allow_builtins: HashSet<String>,
    /// Builtins the SafeEnv always hides. Wins over `allow_builtins`.
    pub blocked_builtins: HashSet<String>,
    /// Elevate Validator warnings to hard errors.
    pub strict_mode: bool,
    /// Permit Unicode in sanitized output; when `false`, sanitization
    /// downcasts to ASCII-ignore.
    pub allow_unicode: bool,
    /// Root directory the Checkpoint Store writes backups under.
    pub backup_root: String,
    /// Shell Executor retry policy for transient errors.
    pub retry: RetryConfig,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            level: PolicyLevel::default(),
            max_wall_ms: 5_000,
            max_cpu_ms: 5_000,
            max_memory_bytes: 64 * 1024 * 1024,
            max_output_bytes: 1024 * 1024,
            max_ast_depth: 50,
            max_loop_iters: 10_000,
            allow_imports: default_allow_imports(),
            blocked_imports: default_blocked_imports(),
            allow_builtins: default_allow_builtins(),
            blocked_builtins: default_blocked_builtins(),
            strict_mode: false,
            allow_unicode: true,
            backup_root: "/tmp/warden-backups".to_string(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_allow_imports() -> HashSet<String> {
    ["math", "json", "re", "itertools", "collections", "datetime", "string"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_blocked_imports() -> HashSet<String> {
    ["os", "sys", "subprocess", "socket", "ctypes", "shutil", "importlib", "pickle"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_allow_builtins() -> HashSet<String> {
    [
        "print", "len", "range", "str", "int", "float", "bool", "list", "dict", "set", "tuple",
        "enumerate", "zip", "map", "filter", "sorted", "min", "max", "sum", "abs", "round",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_blocked_builtins() -> HashSet<String> {
    [
        "eval", "exec", "compile", "open", "getattr", "setattr", "delattr", "globals", "locals",
        "vars", "__import__", "input",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl SandboxPolicy {
    /// Returns `true` if `module` is importable under this policy.
    /// Blocklist always wins.
    #[must_use]
    pub fn import_allowed(&self, module: &str) -> bool {
        if self.blocked_imports.contains(module) {
            return false;
        }
        self.allow_imports.contains(module)
    }

    /// Returns `true` if `name` may be called as a bare-name builtin.
    /// Blocklist always wins.
    #[must_use]
    pub fn builtin_allowed(&self, name: &str) -> bool {
        if self.blocked_builtins.contains(name) {
            return false;
        }
        self.allow_builtins.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_and_above_requires_subprocess() {
        assert!(!PolicyLevel::Minimal.requires_subprocess());
        assert!(!PolicyLevel::Standard.requires_subprocess());
        assert!(PolicyLevel::Strict.requires_subprocess());
        assert!(PolicyLevel::Paranoid.requires_subprocess());
    }

    #[test]
    fn blocklist_wins_over_allowlist() {
        let mut policy = SandboxPolicy::default();
        policy.allow_imports.insert("os".to_string());
        assert!(policy.blocked_imports.contains("os"));
        assert!(!policy.import_allowed("os"));
    }

    #[test]
    fn level_serializes_uppercase() {
        let json = serde_json::to_string(&PolicyLevel::Strict).unwrap();
        assert_eq!(json, "\"STRICT\"");
    }
}
