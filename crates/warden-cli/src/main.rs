//! Entry point for the `warden` binary.
//!
//! Parses CLI arguments, then hands off to [`warden_cli::run_main`]; the
//! split keeps dispatch logic testable without a real process.

use clap::Parser;
use warden_cli::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let code = warden_cli::run_main(cli).await?;
    std::process::exit(code);
}
