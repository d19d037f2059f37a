//! Argument parsing for the `warden` binary.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Validate and run a command, a Python snippet, or a dependency-ordered
/// plan through the warden execution core.
#[derive(Parser, Debug)]
#[command(name = "warden", version, about)]
pub struct Cli {
    /// Path to a config file (YAML, TOML, or JSON) overriding compiled
    /// defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Load `WARDEN_*` overrides from the environment and `.env`.
    #[arg(long, global = true, default_value_t = false)]
    pub env: bool,

    /// What to run.
    #[command(subcommand)]
    pub command: Command,
}

/// The action this invocation performs.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate and run a shell command through the hardened executor.
    Shell {
        /// The command line, tokenized by the executor.
        cmd: String,
        /// Working directory override.
        #[arg(long)]
        cwd: Option<String>,
        /// Per-call timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Environment overlay entries as `KEY=VALUE`, repeatable.
        #[arg(long = "env-var", value_name = "KEY=VALUE")]
        env_vars: Vec<String>,
    },
    /// Validate and run Python source through the sandbox.
    Python {
        /// Path to a file of Python source, or `-` to read stdin.
        file: PathBuf,
    },
    /// Run a dependency-ordered set of steps as one transaction.
    Plan {
        /// Path to a JSON file describing the plan's steps.
        file: PathBuf,
        /// Transaction id for checkpointing and rollback.
        #[arg(long, default_value = "cli-plan")]
        tx_id: String,
    },
    /// Check a value against the input validator without executing it.
    Validate {
        /// The value to validate.
        value: String,
        /// Input kind: command, file_path, prompt, filename, identifier, code, generic.
        #[arg(long, default_value = "generic")]
        kind: String,
    },
}

/// Parse `--env`-style `KEY=VALUE` pairs into a map; unparsable pairs are
/// skipped rather than rejected, since environment overlays are best-effort.
#[must_use]
pub fn parse_env_pairs(pairs: &[String]) -> HashMap<String, String> {
    pairs
        .iter()
        .filter_map(|pair| pair.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
        .collect()
}
