//! ```text
//! Request ──► Validator (5 layers) ──► violated? ──yes──► Outcome::refused
//!                  │
//!                  no
//!                  │
//!      ┌───────────┼────────────────┐
//!      ▼           ▼                ▼
//!   Shell       Python            Plan
//!      │           │                │
//! ShellExecutor PythonSandbox  WorkflowEngine
//!                                   │
//!                         CoreStepRunner (re-validates
//!                         each step, dispatches to the
//!                         same Shell/Python backends)
//! ```
//!
//! # warden-core
//!
//! **The Exec API**: one facade over the validator, the sandbox, the
//! hardened shell executor, and the workflow engine.
//!
//! [`WardenCore`] is what an embedding CLI or service talks to — it
//! never hands a raw string to a shell or an interpreter without first
//! routing it through the Validator, and it never runs a [`Request::Plan`]
//! without the Workflow Engine's checkpointing and critique in the loop.
//!
//! ## Modules
//!
//! - [`config`] – [`config::WardenConfig`] and its file/env-backed builder
//! - [`runner`] – [`runner::CoreStepRunner`], the Workflow Engine's step
//!   dispatch seam
//! - [`tracing_init`] – shared `tracing-subscriber` setup

#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod runner;
pub mod tracing_init;

use std::collections::HashMap;
use std::sync::Arc;

use warden_exec::ShellExecutor;
use warden_sandbox::PythonSandbox;
use warden_types::{AuditSink, NoopSink, Outcome, Request, Step, TracingAuditSink, Violation};
use warden_validator::validator::{InputKind, Validator, ValidatorBuildError};
use warden_workflow::{DependencyGraph, FileCheckpointStore, WorkflowEngine, WorkflowReport};

use config::WardenConfig;
use runner::CoreStepRunner;

/// Failure to construct a [`WardenCore`].
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A configured validator whitelist pattern failed to compile.
    #[error(transparent)]
    Validator(#[from] ValidatorBuildError),
}

/// The single entry point an embedder talks to: validate, then execute.
pub struct WardenCore {
    validator: Arc<Validator>,
    exec: Arc<ShellExecutor>,
    sandbox: Arc<PythonSandbox>,
    checkpoints: Arc<FileCheckpointStore>,
}

impl WardenCore {
    /// Build a core from `config`, routing audit events to `tracing` at
    /// the appropriate level for each decision.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] if the validator's configured whitelist
    /// patterns fail to compile.
    pub fn new(config: WardenConfig) -> Result<Self, CoreError> {
        Self::with_audit_sink(config, Arc::new(TracingAuditSink))
    }

    /// Build a core with an explicit audit sink shared by every layer.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] if the validator's configured whitelist
    /// patterns fail to compile.
    pub fn with_audit_sink(config: WardenConfig, audit: Arc<dyn AuditSink>) -> Result<Self, CoreError> {
        let validator = Arc::new(Validator::with_audit_sink(config.validator.clone(), audit.clone())?);
        let exec = Arc::new(ShellExecutor::with_audit_sink(config.sandbox.clone(), audit.clone()));
        let sandbox = Arc::new(PythonSandbox::with_audit_sink(config.sandbox.clone(), audit));
        let checkpoints = Arc::new(FileCheckpointStore::new(config.checkpoint_root().to_string()));
        Ok(Self { validator, exec, sandbox, checkpoints })
    }

    /// Build a core from default configuration, discarding audit events.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] if the default validator fails to build,
    /// which should not happen with compiled defaults.
    pub fn with_defaults() -> Result<Self, CoreError> {
        Self::with_audit_sink(WardenConfig::default(), Arc::new(NoopSink))
    }

    /// Validate `value` as `kind` without executing anything.
    #[must_use]
    pub fn validate(&self, value: &str, kind: InputKind) -> warden_validator::validator::ValidationResult {
        self.validator.validate(value, kind)
    }

    /// Validate and run a shell command through the hardened executor.
    pub async fn run_shell(
        &self,
        cmd: &str,
        cwd: Option<&str>,
        env: HashMap<String, String>,
        timeout_ms: Option<u64>,
    ) -> Outcome {
        let runner = self.step_runner();
        let step = Step::new(
            "shell",
            Request::Shell { cmd: cmd.to_string(), cwd: cwd.map(str::to_string), env, timeout_ms },
        );
        warden_workflow::StepRunner::run(&runner, &step).await
    }

    /// Validate and run Python source through the sandbox.
    pub async fn run_python(&self, code: &str, globals: HashMap<String, serde_json::Value>) -> Outcome {
        let runner = self.step_runner();
        let step = Step::new("python", Request::Python { code: code.to_string(), globals, locals: HashMap::new() });
        warden_workflow::StepRunner::run(&runner, &step).await
    }

    /// Run a set of dependency-ordered steps as one transaction,
    /// checkpointing risky steps and rolling back the first failure.
    pub async fn run_plan(&self, tx_id: &str, steps: Vec<Step>) -> Result<WorkflowReport, Violation> {
        let mut graph = DependencyGraph::new();
        for step in steps {
            graph.add_step(step);
        }
        let engine = WorkflowEngine::new(Arc::new(self.step_runner()), self.checkpoints.clone(), tx_id.to_string());
        engine.run(&graph).await
    }

    fn step_runner(&self) -> CoreStepRunner {
        CoreStepRunner::new(self.validator.clone(), self.exec.clone(), self.sandbox.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_shell_executes_benign_command() {
        let core = WardenCore::with_defaults().unwrap();
        let outcome = core.run_shell("echo hi", None, HashMap::new(), None).await;
        assert!(outcome.ok, "{outcome:?}");
    }

    #[tokio::test]
    async fn run_python_executes_benign_code() {
        let core = WardenCore::with_defaults().unwrap();
        let outcome = core.run_python("x = 1 + 1", HashMap::new()).await;
        assert!(outcome.ok, "{outcome:?}");
    }

    #[tokio::test]
    async fn run_plan_rolls_back_on_failure() {
        let core = WardenCore::with_defaults().unwrap();
        let steps = vec![
            Step::new(
                "first",
                Request::Shell { cmd: "echo ok".into(), cwd: None, env: HashMap::new(), timeout_ms: None },
            ),
            Step::new(
                "second",
                Request::Shell { cmd: "false".into(), cwd: None, env: HashMap::new(), timeout_ms: None },
            )
            .depends_on(["first"]),
        ];
        let report = core.run_plan("tx-test", steps).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.failure.unwrap().step_id, "second");
    }
}
