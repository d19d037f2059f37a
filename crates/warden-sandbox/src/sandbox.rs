//! Orchestrates the AST analyzer and SafeEnv builder, and decides whether a
//! piece of Python runs in-process or in an isolated subprocess.
//!
//! In-process execution runs RustPython on a dedicated OS thread — the
//! interpreter itself is not `Send` across an `await` point, so the thread
//! plus a result channel is the same shape the hardened shell executor
//! uses for its own timeout path. [`PolicyLevel::requires_subprocess`]
//! decides the boundary: `STRICT` and above always re-exec the caller's
//! own `python3` through [`warden_exec::ShellExecutor`], trading
//! in-process speed for OS-level process isolation.

use std::collections::HashMap;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use rustpython_vm::Interpreter;

use warden_exec::{ExecRequest, ShellExecutor};
use warden_types::{AuditSink, NoopSink, Outcome, SandboxPolicy, Violation, ViolationKind};

use crate::ast_analyzer::AstAnalyzer;
use crate::safe_env::{build_scope, filter_extra_globals, SharedStdout};

/// Secure Python code execution, gated by AST analysis and a restricted
/// global scope.
pub struct PythonSandbox {
    policy: SandboxPolicy,
    audit: std::sync::Arc<dyn AuditSink>,
    exec: ShellExecutor,
}

impl PythonSandbox {
    /// Build a sandbox from `policy`, discarding audit events.
    #[must_use]
    pub fn new(policy: SandboxPolicy) -> Self {
        Self::with_audit_sink(policy, std::sync::Arc::new(NoopSink))
    }

    /// Build a sandbox with an explicit audit sink, shared with the
    /// subprocess-path executor.
    #[must_use]
    pub fn with_audit_sink(policy: SandboxPolicy, audit: std::sync::Arc<dyn AuditSink>) -> Self {
        let exec = ShellExecutor::with_audit_sink(policy.clone(), audit.clone());
        Self { policy, audit, exec }
    }

    /// Statically validate `code` without running it.
    #[must_use]
    pub fn validate(&self, code: &str) -> Vec<Violation> {
        AstAnalyzer::new(&self.policy).check(code)
    }

    /// Run `code`, choosing in-process or subprocess execution per policy.
    pub async fn execute(&self, code: &str, globals: HashMap<String, String>) -> Outcome {
        let start = Instant::now();
        let violations = self.validate(code);
        if !violations.is_empty() {
            let outcome = Outcome::refused(violations);
            self.emit_audit(&outcome);
            return outcome;
        }

        let outcome = if self.policy.level.requires_subprocess() {
            self.run_subprocess(code).await
        } else {
            self.run_in_process(code, globals, start).await
        };
        self.emit_audit(&outcome);
        outcome
    }

    async fn run_in_process(
        &self,
        code: &str,
        globals: HashMap<String, String>,
        start: Instant,
    ) -> Outcome {
        let code = code.to_string();
        let policy = self.policy.clone();
        let globals = filter_extra_globals(&policy, &globals);
        let (tx, rx) = mpsc::channel();
        let stdout: SharedStdout = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
        let stdout_for_thread = std::sync::Arc::clone(&stdout);

        std::thread::spawn(move || {
            let interpreter = Interpreter::without_stdlib(Default::default());
            let result = interpreter.enter(|vm| {
                let scope = build_scope(vm, &policy, &stdout_for_thread);
                for (key, value) in &globals {
                    let _ = scope
                        .globals
                        .set_item(key.as_str(), vm.ctx.new_str(value.as_str()).into(), vm);
                }

                let code_obj = match vm.compile(
                    &code,
                    rustpython_vm::compiler::Mode::Exec,
                    "<sandbox>".to_owned(),
                ) {
                    Ok(obj) => obj,
                    Err(err) => return Err(format!("syntax error: {err}")),
                };

                match vm.run_code_obj(code_obj, scope) {
                    Ok(_) => Ok(()),
                    Err(exc) => Err(vm.exception_to_string(exc)),
                }
            });
            let _ = tx.send(result);
        });

        let timeout = Duration::from_millis(self.policy.max_wall_ms);
        let elapsed_ms = || u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let captured_stdout =
            || stdout.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();

        match rx.recv_timeout(timeout) {
            Ok(Ok(())) => Outcome::success(captured_stdout(), elapsed_ms()),
            Ok(Err(message)) => Outcome::failed(
                captured_stdout(),
                message,
                1,
                elapsed_ms(),
                vec![Violation::new(ViolationKind::SandboxEscape, "execution raised an exception")],
            ),
            Err(mpsc::RecvTimeoutError::Timeout) => Outcome::failed(
                captured_stdout(),
                String::new(),
                124,
                elapsed_ms(),
                vec![Violation::new(
                    ViolationKind::Timeout,
                    format!("python execution exceeded {}ms", self.policy.max_wall_ms),
                )],
            ),
            Err(mpsc::RecvTimeoutError::Disconnected) => Outcome::failed(
                captured_stdout(),
                String::new(),
                1,
                elapsed_ms(),
                vec![Violation::new(ViolationKind::SandboxEscape, "interpreter thread died")],
            ),
        }
    }

    async fn run_subprocess(&self, code: &str) -> Outcome {
        match self
            .exec
            .run(ExecRequest {
                argv: vec!["python3".to_string(), "-c".to_string(), code.to_string()],
                cwd: None,
                env: HashMap::new(),
                timeout_ms: Some(self.policy.max_wall_ms),
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => Outcome::failed(
                String::new(),
                err.to_string(),
                1,
                0,
                vec![Violation::new(ViolationKind::SandboxEscape, "failed to spawn python3 subprocess")],
            ),
        }
    }

    fn emit_audit(&self, outcome: &Outcome) {
        if outcome.ok && outcome.violations.is_empty() {
            return;
        }
        self.audit.emit(warden_types::AuditEvent {
            t: warden_types::now_ms(),
            component: "python_sandbox".to_string(),
            action: "execute".to_string(),
            decision: if outcome.ok { "allow".to_string() } else { "block".to_string() },
            violations: outcome.violations.clone(),
            context: serde_json::json!({ "level": self.policy.level }),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocked_import_refuses_without_running() {
        let sandbox = PythonSandbox::new(SandboxPolicy::default());
        let outcome = sandbox.execute("import os", HashMap::new()).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.violations[0].kind, ViolationKind::BlockedImport);
        assert_eq!(outcome.exit_code, 0, "refusal never runs, so no exit code applies");
    }

    #[tokio::test]
    async fn validate_reports_without_executing() {
        let sandbox = PythonSandbox::new(SandboxPolicy::default());
        let violations = sandbox.validate("import socket");
        assert_eq!(violations.len(), 1);
    }

    #[tokio::test]
    async fn benign_assignment_runs_in_process() {
        let sandbox = PythonSandbox::new(SandboxPolicy::default());
        let outcome = sandbox.execute("x = 1 + 1", HashMap::new()).await;
        assert!(outcome.ok, "{outcome:?}");
    }

    #[tokio::test]
    async fn print_output_is_captured_in_process() {
        let sandbox = PythonSandbox::new(SandboxPolicy::default());
        let outcome = sandbox.execute("print('hi')", HashMap::new()).await;
        assert!(outcome.ok, "{outcome:?}");
        assert_eq!(outcome.stdout, "hi\n");
    }
}
