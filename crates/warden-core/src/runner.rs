//! Wires [`warden_workflow::StepRunner`] to the validator, the sandbox,
//! and the hardened shell executor — the piece the workflow engine
//! itself deliberately has no opinion on.
//!
//! Every step still passes through the Validator before it reaches an
//! executor, even inside a Plan: a step's `Request::Shell.cmd` or
//! `Request::Python.code` is exactly the kind of untrusted string the
//! fortress exists to check, regardless of whether it arrived as a
//! one-off call or as one node of a larger workflow.

use std::sync::Arc;

use async_trait::async_trait;

use warden_exec::{ExecRequest, ShellExecutor};
use warden_sandbox::PythonSandbox;
use warden_types::{Outcome, Request, Step, Violation, ViolationKind};
use warden_validator::validator::{InputKind, Validator};
use warden_workflow::StepRunner;

/// A [`StepRunner`] that validates a step's action before dispatching it
/// to the shell executor or the Python sandbox.
pub struct CoreStepRunner {
    validator: Arc<Validator>,
    exec: Arc<ShellExecutor>,
    sandbox: Arc<PythonSandbox>,
}

impl CoreStepRunner {
    /// Build a runner from the three components it dispatches to.
    #[must_use]
    pub fn new(validator: Arc<Validator>, exec: Arc<ShellExecutor>, sandbox: Arc<PythonSandbox>) -> Self {
        Self { validator, exec, sandbox }
    }

    async fn run_shell(&self, cmd: &str, cwd: Option<&str>, env: &std::collections::HashMap<String, String>, timeout_ms: Option<u64>) -> Outcome {
        let validated = self.validator.validate(cmd, InputKind::Command);
        if !validated.allowed {
            return Outcome::refused(validated.violations);
        }
        let argv: Vec<String> = validated.sanitized.split_whitespace().map(str::to_string).collect();
        match self
            .exec
            .run(ExecRequest { argv, cwd: cwd.map(Into::into), env: env.clone(), timeout_ms })
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => Outcome::failed("", err.to_string(), 127, 0, vec![Violation::new(ViolationKind::CommandInjection, "failed to spawn step command")]),
        }
    }

    async fn run_python(&self, code: &str, globals: &std::collections::HashMap<String, serde_json::Value>) -> Outcome {
        let validated = self.validator.validate(code, InputKind::Code);
        if !validated.allowed {
            return Outcome::refused(validated.violations);
        }
        let string_globals = globals
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
        self.sandbox.execute(&validated.sanitized, string_globals).await
    }
}

#[async_trait]
impl StepRunner for CoreStepRunner {
    async fn run(&self, step: &Step) -> Outcome {
        match &step.action {
            Request::Shell { cmd, cwd, env, timeout_ms } => {
                self.run_shell(cmd, cwd.as_deref(), env, *timeout_ms).await
            }
            Request::Python { code, globals, .. } => self.run_python(code, globals).await,
            Request::Plan { .. } => Outcome::refused(vec![Violation::with_severity(
                ViolationKind::Cycle,
                "nested plans are not supported; flatten steps into one Plan",
                warden_types::Severity::Medium,
            )]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::SandboxPolicy;

    fn runner() -> CoreStepRunner {
        let policy = SandboxPolicy::default();
        CoreStepRunner::new(
            Arc::new(Validator::new(warden_validator::config::ValidatorPolicy::default()).unwrap()),
            Arc::new(ShellExecutor::new(policy.clone())),
            Arc::new(PythonSandbox::new(policy)),
        )
    }

    #[tokio::test]
    async fn benign_shell_step_runs() {
        let step = Step::new(
            "s1",
            Request::Shell { cmd: "echo hi".into(), cwd: None, env: std::collections::HashMap::new(), timeout_ms: None },
        );
        let outcome = runner().run(&step).await;
        assert!(outcome.ok, "{outcome:?}");
        assert!(outcome.stdout.contains("hi"));
    }

    #[tokio::test]
    async fn injection_attempt_is_refused_before_exec() {
        let step = Step::new(
            "s1",
            Request::Shell { cmd: "ls; rm -rf /".into(), cwd: None, env: std::collections::HashMap::new(), timeout_ms: None },
        );
        let outcome = runner().run(&step).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.exit_code, 0, "refused before any process was spawned");
    }

    #[tokio::test]
    async fn benign_python_step_runs() {
        let step = Step::new(
            "s1",
            Request::Python { code: "x = 1 + 1".into(), globals: std::collections::HashMap::new(), locals: std::collections::HashMap::new() },
        );
        let outcome = runner().run(&step).await;
        assert!(outcome.ok, "{outcome:?}");
    }
}
