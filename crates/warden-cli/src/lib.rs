//! Library half of the `warden` binary: argument parsing lives in
//! [`cli`], dispatch and the exit-code contract live in [`run_main`].
//! Splitting the two keeps `main.rs` a thin shim, the same shape
//! `codex-exec` uses for its own CLI.
//!
//! ## Exit codes
//!
//! - `0` — the action completed and its own exit status (if any) was `0`
//! - `124` — the action was killed for exceeding its wall-clock budget
//! - `126` — the validator or a sandbox gate refused the action before
//!   anything ran
//! - `127` — the core failed to spawn the action (bad binary, resource
//!   exhaustion)
//! - any other code — passed through verbatim from the action's own
//!   process exit status

pub mod cli;

use std::collections::HashMap;

use cli::{Cli, Command};
use warden_core::config::ConfigBuilder;
use warden_core::WardenCore;
use warden_validator::validator::InputKind;

/// Parse `kind` into an [`InputKind`], defaulting to [`InputKind::Generic`]
/// on an unrecognized value.
fn parse_input_kind(kind: &str) -> InputKind {
    match kind {
        "command" => InputKind::Command,
        "file_path" => InputKind::FilePath,
        "prompt" => InputKind::Prompt,
        "filename" => InputKind::Filename,
        "identifier" => InputKind::Identifier,
        "code" => InputKind::Code,
        _ => InputKind::Generic,
    }
}

/// Map an [`warden_types::Outcome`] to this CLI's exit-code contract.
fn exit_code_for(outcome: &warden_types::Outcome) -> i32 {
    if outcome.ok {
        return 0;
    }
    if outcome.exit_code == 0 && !outcome.violations.is_empty() {
        return 126;
    }
    if outcome.violations.iter().any(|v| v.kind == warden_types::ViolationKind::Timeout) {
        return 124;
    }
    if outcome.exit_code == 127 {
        return 127;
    }
    outcome.exit_code
}

/// Run the parsed CLI invocation to completion, printing its result and
/// returning the process exit code per the contract documented on this
/// module.
///
/// # Errors
///
/// Returns an error if the core fails to build (e.g. a malformed config
/// file or an invalid configured whitelist pattern), or if a plan file
/// fails to parse as JSON.
pub async fn run_main(cli: Cli) -> anyhow::Result<i32> {
    warden_core::tracing_init::init();

    let mut builder = ConfigBuilder::new();
    if let Some(path) = &cli.config {
        builder = builder.with_file(path)?;
    }
    if cli.env {
        builder = builder.with_env();
    }
    let config = builder.build()?;
    let core = WardenCore::new(config)?;

    match cli.command {
        Command::Shell { cmd, cwd, timeout_ms, env_vars } => {
            let env = cli::parse_env_pairs(&env_vars);
            let outcome = core.run_shell(&cmd, cwd.as_deref(), env, timeout_ms).await;
            print_outcome(&outcome);
            Ok(exit_code_for(&outcome))
        }
        Command::Python { file } => {
            let code = read_source(&file)?;
            let outcome = core.run_python(&code, HashMap::new()).await;
            print_outcome(&outcome);
            Ok(exit_code_for(&outcome))
        }
        Command::Plan { file, tx_id } => {
            let content = std::fs::read_to_string(&file)?;
            let steps: Vec<warden_types::Step> = serde_json::from_str(&content)?;
            let report = core.run_plan(&tx_id, steps).await.map_err(|v| anyhow::anyhow!("{}", v.message))?;
            println!("{}", serde_json::to_string_pretty(&report_as_json(&report))?);
            Ok(if report.success { 0 } else { 1 })
        }
        Command::Validate { value, kind } => {
            let result = core.validate(&value, parse_input_kind(&kind));
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.allowed { 0 } else { 126 })
        }
    }
}

fn read_source(path: &std::path::Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        use std::io::Read;
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn print_outcome(outcome: &warden_types::Outcome) {
    if !outcome.stdout.is_empty() {
        print!("{}", outcome.stdout);
    }
    if !outcome.stderr.is_empty() {
        eprint!("{}", outcome.stderr);
    }
    if !outcome.ok {
        for violation in &outcome.violations {
            eprintln!("warden: {}: {}", violation.kind, violation.message);
        }
    }
}

fn report_as_json(report: &warden_workflow::WorkflowReport) -> serde_json::Value {
    serde_json::json!({
        "success": report.success,
        "failure": report.failure.as_ref().map(|f| serde_json::json!({
            "step_id": f.step_id,
            "reason": f.reason,
        })),
        "rolled_back": report.rolled_back,
        "step_count": report.outcomes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_zero_for_ok_outcome() {
        let outcome = warden_types::Outcome::success("hi", 1);
        assert_eq!(exit_code_for(&outcome), 0);
    }

    #[test]
    fn exit_code_126_for_refusal() {
        let outcome = warden_types::Outcome::refused(vec![warden_types::Violation::new(
            warden_types::ViolationKind::CommandInjection,
            "blocked",
        )]);
        assert_eq!(exit_code_for(&outcome), 126);
    }

    #[test]
    fn exit_code_124_for_timeout() {
        let outcome = warden_types::Outcome::failed(
            "",
            "",
            124,
            10,
            vec![warden_types::Violation::new(warden_types::ViolationKind::Timeout, "too slow")],
        );
        assert_eq!(exit_code_for(&outcome), 124);
    }

    #[test]
    fn exit_code_passes_through_nonzero_exit() {
        let outcome = warden_types::Outcome::failed("", "boom", 7, 10, Vec::new());
        assert_eq!(exit_code_for(&outcome), 7);
    }
}
