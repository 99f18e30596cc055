//! `crypt-tool`: operator CLI over the `record-crypt` envelope engine.
//!
//! Startup sequence:
//! 1. Parse arguments.
//! 2. Load and validate [`ToolConfig`](config::ToolConfig) from environment variables.
//! 3. Initialise structured JSON logging.
//! 4. Run the requested command.

mod args;
mod config;
mod telemetry;
mod tool;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Arguments
    // -----------------------------------------------------------------------
    let cli = args::Cli::parse();

    // -----------------------------------------------------------------------
    // 2. Configuration
    // -----------------------------------------------------------------------
    let cfg = config::ToolConfig::from_env().map_err(|e| {
        eprintln!("ERROR: crypt-tool configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 3. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;

    // -----------------------------------------------------------------------
    // 4. Command
    // -----------------------------------------------------------------------
    let output = tool::run(cli.command, &cfg).await?;
    println!("{output}");
    Ok(())
}
