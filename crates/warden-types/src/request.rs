//! The closed set of actions a caller may request.
//!
//! `Request` replaces the dynamic `**kwargs` tool-dispatch shape a
//! reflection-heavy implementation would use: each variant has fixed,
//! validated fields, and a generic "tool call" map is not representable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One action a caller asks the core to validate and/or execute.
///
/// Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Run a command through the Hardened Shell Executor.
    Shell {
        /// The command line, tokenized by the executor — never handed to a
        /// shell.
        cmd: String,
        /// Working directory override.
        #[serde(skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
        /// Environment overlay applied on top of the scrubbed parent env.
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
        /// Per-call timeout override, in milliseconds.
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Run Python source through the Sandbox.
    Python {
        /// Untrusted source text.
        code: String,
        /// Extra globals merged into the SafeEnv, filtered by the import
        /// and builtin gate before the interpreter sees them.
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        globals: HashMap<String, serde_json::Value>,
        /// Extra locals merged into the SafeEnv.
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        locals: HashMap<String, serde_json::Value>,
    },
    /// Run a dependency-ordered set of steps inside one Transaction.
    Plan {
        /// The steps to schedule; order in this vector carries no meaning,
        /// `depends_on` is authoritative.
        steps: Vec<Step>,
    },
}

impl Request {
    /// Short, stable label for logging and audit events.
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Shell { .. } => "shell",
            Self::Python { .. } => "python",
            Self::Plan { .. } => "plan",
        }
    }
}

/// Lifecycle state of a [`Step`] within a running Plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet dispatched; waiting on dependencies or scheduling.
    Pending,
    /// Currently dispatched to Sandbox or ShellExec.
    Executing,
    /// Finished with `outcome.ok == true` and critique passed.
    Completed,
    /// Finished with a failure, or critique rejected the result.
    Failed,
    /// Never run because an earlier dependency failed.
    Skipped,
}

/// One node in a Plan's dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Caller-assigned identifier, unique within the Plan.
    pub id: String,
    /// The action this step performs once dispatched.
    pub action: Request,
    /// Ids of steps that must reach `Completed` before this one is
    /// eligible to run.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Whether this step may touch the filesystem outside the action's own
    /// scratch space; gates checkpointing.
    #[serde(default)]
    pub risky: bool,
    /// Whether the step declares a write-set precise enough to support
    /// rollback. A step with `risky=true` and `reversible=false` is run
    /// only if the Plan explicitly opts into `irreversible=true`.
    #[serde(default)]
    pub reversible: bool,
    /// Absolute paths this step may modify; the basis for checkpointing.
    /// Empty means "no rollback" per the write-set Open Question.
    #[serde(default)]
    pub write_set: Vec<String>,
    /// Current lifecycle state; mutated only by the Workflow Engine.
    #[serde(default = "default_status")]
    pub status: StepStatus,
    /// Wall-clock time the step took once dispatched, in milliseconds.
    #[serde(default)]
    pub elapsed_ms: u64,
}

fn default_status() -> StepStatus {
    StepStatus::Pending
}

impl Step {
    /// Construct a pending step with no write-set (irreversible by
    /// default; callers that need rollback must call
    /// [`Step::with_write_set`]).
    #[must_use]
    pub fn new(id: impl Into<String>, action: Request) -> Self {
        Self {
            id: id.into(),
            action,
            depends_on: Vec::new(),
            risky: false,
            reversible: false,
            write_set: Vec::new(),
            status: StepStatus::Pending,
            elapsed_ms: 0,
        }
    }

    /// Mark this step as risky and reversible with an explicit write-set.
    #[must_use]
    pub fn with_write_set(mut self, risky: bool, write_set: Vec<String>) -> Self {
        self.risky = risky;
        self.reversible = !write_set.is_empty();
        self.write_set = write_set;
        self
    }

    /// Mark dependency ids.
    #[must_use]
    pub fn depends_on(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }
}
