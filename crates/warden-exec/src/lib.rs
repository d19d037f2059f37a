//! Hardened, argv-only subprocess executor.
//!
//! [`ShellExecutor::run`] never hands a string to `/bin/sh -c`: the caller
//! supplies an already-tokenized argument vector, which is executed
//! directly. This closes off the entire class of shell-metacharacter
//! injection bugs that a `shell=True`-style executor has to detect after
//! the fact with regexes.
//!
//! Every call still applies: a destructive-shape blocklist, rlimits
//! (CPU/memory/open-files), a wall-clock timeout, output truncation, env
//! scrubbing, and exponential-backoff retry for transient spawn failures.

mod limits;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;

use warden_types::{AuditEvent, AuditSink, NoopSink, Outcome, SandboxPolicy, Severity, Violation, ViolationKind};

use limits::ResourceLimits;

const MAX_STREAM_LINES: usize = 10_000;

/// Exact command shapes that are never allowed to run, regardless of
/// policy level — known-destructive one-liners with no legitimate use.
const BLOCKED_EXACT_SHAPES: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "rm -rf ~",
    "rm -rf ~/*",
    "chmod -r 777 /",
    "mkfs",
    ":(){ :|:& };:",
];

/// Interpreters that, if invoked as argv[0] with a `-c`/`-lc` script
/// argument, would let a caller smuggle an entire shell pipeline past the
/// "argv-only" contract. Running the interpreter for any other purpose
/// (e.g. `python3 script.py`) is unaffected.
const SHELL_INTERPRETERS: &[&str] = &["sh", "bash", "zsh", "dash", "ksh"];

/// Errors raised before or while spawning — distinct from a completed-but-
/// failed [`Outcome`], which is returned, not raised.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The argument vector was empty.
    #[error("command argument vector is empty")]
    EmptyCommand,
    /// Spawning the child process failed at the OS level.
    #[error("failed to spawn child process: {0}")]
    Spawn(#[from] std::io::Error),
}

/// One request to run an argv vector through the executor.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// `argv[0]` is the program; the rest are passed as literal arguments.
    pub argv: Vec<String>,
    /// Working directory override.
    pub cwd: Option<PathBuf>,
    /// Environment overlay merged onto the scrubbed base environment.
    pub env: HashMap<String, String>,
    /// Per-call timeout override, in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Executes argv vectors under the budgets declared in a [`SandboxPolicy`].
pub struct ShellExecutor {
    policy: SandboxPolicy,
    audit: Arc<dyn AuditSink>,
}

impl ShellExecutor {
    /// Build an executor from `policy`, discarding audit events.
    #[must_use]
    pub fn new(policy: SandboxPolicy) -> Self {
        Self::with_audit_sink(policy, Arc::new(NoopSink))
    }

    /// Build an executor with an explicit audit sink.
    #[must_use]
    pub fn with_audit_sink(policy: SandboxPolicy, audit: Arc<dyn AuditSink>) -> Self {
        Self { policy, audit }
    }

    /// Run `request`, retrying transient spawn failures per the policy's
    /// [`warden_types::RetryConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] for programmer errors (empty argv) and for
    /// spawn failures that survive every retry. A refused or failed command
    /// is reported via [`Outcome`], not `Err`.
    pub async fn run(&self, request: ExecRequest) -> Result<Outcome, ExecError> {
        if request.argv.is_empty() {
            return Err(ExecError::EmptyCommand);
        }

        if let Some(violation) = self.check_blocklist(&request.argv) {
            let outcome = Outcome::refused(vec![violation]);
            self.emit_audit(&request, &outcome);
            return Ok(outcome);
        }

        let mut attempt = 0;
        let retry = &self.policy.retry;
        loop {
            attempt += 1;
            match self.run_once(&request).await {
                Ok(outcome) => {
                    self.emit_audit(&request, &outcome);
                    return Ok(outcome);
                }
                Err(err) if attempt < retry.max_attempts => {
                    let delay_ms = (retry.base_delay_ms * 2u64.pow(attempt - 1)).min(retry.max_delay_ms);
                    tracing::warn!(attempt, %err, delay_ms, "shell exec spawn failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn check_blocklist(&self, argv: &[String]) -> Option<Violation> {
        let joined = argv.join(" ").to_lowercase();
        for shape in BLOCKED_EXACT_SHAPES {
            if joined.contains(shape) {
                return Some(Violation::with_severity(
                    ViolationKind::CommandInjection,
                    format!("blocked destructive command shape: {shape}"),
                    Severity::Critical,
                ));
            }
        }

        if argv.len() >= 2
            && SHELL_INTERPRETERS.contains(&argv[0].as_str())
            && matches!(argv[1].as_str(), "-c" | "-lc")
        {
            return Some(Violation::with_severity(
                ViolationKind::CommandInjection,
                "invoking a shell interpreter with -c defeats argv-only execution",
                Severity::Critical,
            ));
        }

        None
    }

    async fn run_once(&self, request: &ExecRequest) -> Result<Outcome, ExecError> {
        let start = Instant::now();
        let timeout_ms = request
            .timeout_ms
            .unwrap_or(self.policy.max_wall_ms)
            .min(self.policy.max_wall_ms);

        let mut cmd = Command::new(&request.argv[0]);
        cmd.args(&request.argv[1..]);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        self.configure_env(&mut cmd, &request.env);
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        #[cfg(unix)]
        {
            let limits = ResourceLimits {
                cpu_seconds: self.policy.max_cpu_ms.div_ceil(1000),
                memory_bytes: self.policy.max_memory_bytes,
                max_open_files: 128,
            };
            unsafe {
                use std::os::unix::process::CommandExt;
                cmd.pre_exec(move || limits::apply(limits));
            }
        }

        cmd.kill_on_drop(true);
        let mut child = cmd.spawn()?;

        let stdout_pipe = child.stdout.take().expect("stdout piped");
        let stderr_pipe = child.stderr.take().expect("stderr piped");
        let max_output = self.policy.max_output_bytes as usize;

        let stdout_task = tokio::spawn(read_capped(BufReader::new(stdout_pipe), max_output));
        let stderr_task = tokio::spawn(read_capped(BufReader::new(stderr_pipe), max_output));

        let wait = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            child.wait(),
        )
        .await;

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let exit_status = match wait {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                let (stdout, stdout_truncated) = stdout_task.await.unwrap_or_default();
                let (stderr, stderr_truncated) = stderr_task.await.unwrap_or_default();
                let mut outcome = Outcome::failed(
                    String::from_utf8_lossy(&stdout).to_string(),
                    String::from_utf8_lossy(&stderr).to_string(),
                    124,
                    elapsed_ms,
                    vec![Violation::new(
                        ViolationKind::Timeout,
                        format!("command exceeded {timeout_ms}ms wall-clock budget"),
                    )],
                );
                outcome = outcome.with_truncated(stdout_truncated || stderr_truncated);
                return Ok(outcome);
            }
        };

        let (stdout, stdout_truncated) = stdout_task.await.unwrap_or_default();
        let (stderr, stderr_truncated) = stderr_task.await.unwrap_or_default();
        let truncated = stdout_truncated || stderr_truncated;
        let exit_code = exit_status.code().unwrap_or(-1);

        let outcome = if exit_code == 0 {
            Outcome::success(String::from_utf8_lossy(&stdout).to_string(), elapsed_ms)
                .with_truncated(truncated)
        } else {
            Outcome::failed(
                String::from_utf8_lossy(&stdout).to_string(),
                String::from_utf8_lossy(&stderr).to_string(),
                exit_code,
                elapsed_ms,
                Vec::new(),
            )
            .with_truncated(truncated)
        };

        Ok(outcome)
    }

    fn configure_env(&self, cmd: &mut Command, overlay: &HashMap<String, String>) {
        cmd.env_clear();
        cmd.env("PATH", "/usr/local/bin:/usr/bin:/bin");
        cmd.env("BASH_ENV", "");
        cmd.env("ENV", "");
        for (key, value) in overlay {
            if matches!(key.as_str(), "LD_PRELOAD" | "LD_LIBRARY_PATH" | "BASH_ENV") {
                continue;
            }
            cmd.env(key, value);
        }
    }

    fn emit_audit(&self, request: &ExecRequest, outcome: &Outcome) {
        if outcome.ok && outcome.violations.is_empty() {
            return;
        }
        self.audit.emit(AuditEvent {
            t: warden_types::now_ms(),
            component: "shell_exec".to_string(),
            action: format!("run:{}", request.argv.first().map(String::as_str).unwrap_or("?")),
            decision: if outcome.ok { "allow".to_string() } else { "block".to_string() },
            violations: outcome.violations.clone(),
            context: serde_json::json!({ "exit_code": outcome.exit_code }),
        });
    }
}

async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, max_bytes: usize) -> (Vec<u8>, bool) {
    let mut buf = Vec::with_capacity(max_bytes.min(8 * 1024));
    let mut tmp = [0u8; 8192];
    let mut truncated = false;
    let mut lines = 0usize;

    loop {
        let n = match reader.read(&mut tmp).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        for &b in &tmp[..n] {
            if buf.len() >= max_bytes || lines >= MAX_STREAM_LINES {
                truncated = true;
                continue;
            }
            buf.push(b);
            if b == b'\n' {
                lines += 1;
            }
        }
    }

    (buf, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> ShellExecutor {
        ShellExecutor::new(SandboxPolicy::default())
    }

    #[tokio::test]
    async fn runs_a_benign_command() {
        let exec = executor();
        let outcome = exec
            .run(ExecRequest {
                argv: vec!["echo".into(), "hello".into()],
                cwd: None,
                env: HashMap::new(),
                timeout_ms: None,
            })
            .await
            .unwrap();
        assert!(outcome.ok, "{outcome:?}");
        assert!(outcome.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn blocks_destructive_shape() {
        let exec = executor();
        let outcome = exec
            .run(ExecRequest {
                argv: vec!["rm".into(), "-rf".into(), "/".into()],
                cwd: None,
                env: HashMap::new(),
                timeout_ms: None,
            })
            .await
            .unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.violations[0].kind, ViolationKind::CommandInjection);
    }

    #[tokio::test]
    async fn blocks_shell_dash_c_escape() {
        let exec = executor();
        let outcome = exec
            .run(ExecRequest {
                argv: vec!["bash".into(), "-c".into(), "echo hi".into()],
                cwd: None,
                env: HashMap::new(),
                timeout_ms: None,
            })
            .await
            .unwrap();
        assert!(!outcome.ok);
    }

    #[tokio::test]
    async fn empty_argv_is_a_programmer_error() {
        let exec = executor();
        let result = exec
            .run(ExecRequest {
                argv: vec![],
                cwd: None,
                env: HashMap::new(),
                timeout_ms: None,
            })
            .await;
        assert!(matches!(result, Err(ExecError::EmptyCommand)));
    }

    #[tokio::test]
    async fn timeout_kills_long_running_command() {
        let mut policy = SandboxPolicy::default();
        policy.max_wall_ms = 50;
        let exec = ShellExecutor::new(policy);
        let outcome = exec
            .run(ExecRequest {
                argv: vec!["sleep".into(), "5".into()],
                cwd: None,
                env: HashMap::new(),
                timeout_ms: None,
            })
            .await
            .unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.exit_code, 124);
        assert!(
            outcome
                .violations
                .iter()
                .any(|v| v.kind == ViolationKind::Timeout)
        );
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_without_a_violation() {
        let exec = executor();
        let outcome = exec
            .run(ExecRequest {
                argv: vec!["false".into()],
                cwd: None,
                env: HashMap::new(),
                timeout_ms: None,
            })
            .await
            .unwrap();
        assert!(!outcome.ok);
        assert_ne!(outcome.exit_code, 0);
        assert!(outcome.violations.is_empty());
    }
}
