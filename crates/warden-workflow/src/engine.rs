//! Drives a [`DependencyGraph`] to completion: one antichain level at a
//! time, steps within a level run concurrently, risky steps are
//! checkpointed first and rolled back on failure.
//!
//! Actual step execution is delegated to a caller-supplied
//! [`StepRunner`] — this crate only schedules, critiques, and
//! checkpoints. Wiring a runner to the sandbox, the shell executor, or
//! anything else is left to the embedder.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use warden_types::{Outcome, Step};

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::critique::Critique;
use crate::graph::DependencyGraph;

/// Executes a single step's [`warden_types::Request`] and produces its
/// [`Outcome`]. Implemented by the embedder, wiring to whatever
/// execution backends the caller has available.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run one step and return its outcome.
    async fn run(&self, step: &Step) -> Outcome;
}

/// Failure reported for one step in a completed or aborted workflow run.
#[derive(Debug, Clone)]
pub struct StepFailure {
    /// The step that failed.
    pub step_id: String,
    /// Why it's considered a failure: either the outcome was not ok, or
    /// its critique didn't pass.
    pub reason: String,
}

/// The result of running a workflow to completion or to its first
/// unrecoverable failure.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    /// Per-step outcomes, in the order steps completed.
    pub outcomes: HashMap<String, Outcome>,
    /// Per-step critiques, keyed by step id.
    pub critiques: HashMap<String, Critique>,
    /// Whether every step completed and passed critique.
    pub success: bool,
    /// The first step that failed, if any.
    pub failure: Option<StepFailure>,
    /// Whether a rollback was performed because of `failure`.
    pub rolled_back: bool,
}

/// Schedules a [`DependencyGraph`] through antichain levels, checkpointing
/// risky steps and rolling the transaction back on the first failure.
pub struct WorkflowEngine<S: CheckpointStore> {
    runner: Arc<dyn StepRunner>,
    checkpoints: Arc<S>,
    tx_id: String,
}

impl<S: CheckpointStore> WorkflowEngine<S> {
    /// Build an engine that dispatches steps to `runner` and checkpoints
    /// risky ones into `checkpoints` under transaction id `tx_id`.
    #[must_use]
    pub fn new(runner: Arc<dyn StepRunner>, checkpoints: Arc<S>, tx_id: impl Into<String>) -> Self {
        Self { runner, checkpoints, tx_id: tx_id.into() }
    }

    /// Execute every step in `graph`, level by level.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph itself is malformed (a cycle or an
    /// unknown dependency) — per-step failures are reported in the
    /// returned [`WorkflowReport`] instead, since recovering from them
    /// (via rollback) is part of normal operation, not an error path.
    pub async fn run(&self, graph: &DependencyGraph) -> Result<WorkflowReport, warden_types::Violation> {
        let levels = graph.antichain_levels()?;
        let mut outcomes = HashMap::new();
        let mut critiques = HashMap::new();
        let mut failure = None;

        'levels: for level in levels {
            let mut handles = Vec::with_capacity(level.len());
            for step in level {
                let runner = self.runner.clone();
                let checkpoints = self.checkpoints.clone();
                let tx_id = self.tx_id.clone();
                handles.push(tokio::spawn(async move {
                    let checkpoint_id = step.id.clone();
                    if step.risky {
                        let paths: Vec<PathBuf> = step.write_set.iter().map(PathBuf::from).collect();
                        if let Err(err) = checkpoints.save(&tx_id, &checkpoint_id, &paths).await {
                            return (step, None, None, Some(format!("checkpoint failed: {err}")));
                        }
                    }
                    let outcome = runner.run(&step).await;
                    let critique = Critique::of(&outcome, outcome.elapsed_ms);
                    let reason = if !outcome.ok {
                        Some("step outcome was not ok".to_string())
                    } else if !critique.passed {
                        Some(format!("critique failed: {}", critique.issues.join("; ")))
                    } else {
                        None
                    };
                    (step, Some(outcome), Some(critique), reason)
                }));
            }

            for handle in handles {
                let (step, outcome, critique, reason) = handle.await.expect("step task panicked");
                if let Some(outcome) = outcome {
                    outcomes.insert(step.id.clone(), outcome);
                }
                if let Some(critique) = critique {
                    critiques.insert(step.id.clone(), critique);
                }
                if let Some(reason) = reason {
                    failure = Some(StepFailure { step_id: step.id.clone(), reason });
                    break 'levels;
                }
            }
        }

        let rolled_back = if let Some(failed) = &failure {
            self.rollback(failed).await.is_ok()
        } else {
            self.checkpoints.discard_transaction(&self.tx_id).await.is_ok()
        };

        Ok(WorkflowReport { outcomes, critiques, success: failure.is_none(), failure, rolled_back })
    }

    async fn rollback(&self, failure: &StepFailure) -> Result<(), CheckpointError> {
        tracing::warn!(
            step = %failure.step_id,
            reason = %failure.reason,
            "workflow step failed, rolling back transaction"
        );
        self.checkpoints.restore_transaction(&self.tx_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::FileCheckpointStore;
    use std::collections::HashMap as Map;
    use warden_types::Request;

    struct EchoRunner;

    #[async_trait]
    impl StepRunner for EchoRunner {
        async fn run(&self, step: &Step) -> Outcome {
            if step.id == "fails" {
                Outcome::failed("", "boom", 1, 5, Vec::new())
            } else {
                Outcome::success(format!("ran {}", step.id), 5)
            }
        }
    }

    fn step(id: &str, deps: &[&str]) -> Step {
        Step::new(
            id,
            Request::Python { code: "pass".into(), globals: Map::new(), locals: Map::new() },
        )
        .depends_on(deps.iter().copied())
    }

    fn risky_step(id: &str, deps: &[&str], write_set: &[&str]) -> Step {
        step(id, deps).with_write_set(true, write_set.iter().map(|p| (*p).to_string()).collect())
    }

    #[tokio::test]
    async fn all_steps_succeed() {
        let mut graph = DependencyGraph::new();
        graph.add_step(step("a", &[]));
        graph.add_step(step("b", &["a"]));

        let backup_root = tempfile::tempdir().unwrap();
        let engine = WorkflowEngine::new(
            Arc::new(EchoRunner),
            Arc::new(FileCheckpointStore::new(backup_root.path())),
            "tx-success",
        );
        let report = engine.run(&graph).await.unwrap();
        assert!(report.success);
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.failure.is_none());
    }

    #[tokio::test]
    async fn a_failing_step_aborts_and_rolls_back() {
        let mut graph = DependencyGraph::new();
        graph.add_step(step("a", &[]));
        graph.add_step(step("fails", &["a"]));
        graph.add_step(step("never_runs", &["fails"]));

        let backup_root = tempfile::tempdir().unwrap();
        let engine = WorkflowEngine::new(
            Arc::new(EchoRunner),
            Arc::new(FileCheckpointStore::new(backup_root.path())),
            "tx-fail",
        );
        let report = engine.run(&graph).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.failure.unwrap().step_id, "fails");
        assert!(!report.outcomes.contains_key("never_runs"));
    }

    /// Writes `mutated-by-<id>` into every path in the step's `write_set`
    /// before reporting success; `"fails"` reports failure without writing.
    struct FileMutatingRunner;

    #[async_trait]
    impl StepRunner for FileMutatingRunner {
        async fn run(&self, step: &Step) -> Outcome {
            if step.id == "fails" {
                return Outcome::failed("", "boom", 1, 5, Vec::new());
            }
            for path in &step.write_set {
                tokio::fs::write(path, format!("mutated-by-{}", step.id)).await.unwrap();
            }
            Outcome::success(format!("ran {}", step.id), 5)
        }
    }

    #[tokio::test]
    async fn rollback_restores_every_succeeded_risky_step_in_the_transaction() {
        let workdir = tempfile::tempdir().unwrap();
        let backup_root = tempfile::tempdir().unwrap();
        let file_a = workdir.path().join("a.txt");
        tokio::fs::write(&file_a, "a-original").await.unwrap();

        let mut graph = DependencyGraph::new();
        graph.add_step(risky_step("a", &[], &[file_a.to_str().unwrap()]));
        graph.add_step(step("fails", &["a"]));

        let engine = WorkflowEngine::new(
            Arc::new(FileMutatingRunner),
            Arc::new(FileCheckpointStore::new(backup_root.path())),
            "tx-multi-rollback",
        );
        let report = engine.run(&graph).await.unwrap();

        assert!(!report.success);
        assert!(report.rolled_back);
        assert_eq!(
            tokio::fs::read_to_string(&file_a).await.unwrap(),
            "a-original",
            "step `a` succeeded and mutated the file, but `fails` failed later in the \
             same transaction — its checkpoint must still be rolled back"
        );
    }
}
