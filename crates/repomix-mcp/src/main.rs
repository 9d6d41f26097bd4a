//! Repomix MCP server binary.
//!
//! Exposes repomix to MCP clients (Claude Code, Gemini CLI, opencode).
//! Local paths are confined to the directory the server is started in.
//!
//! Usage:
//!   # Run repomix through npx (default)
//!   cargo run -p repomix-mcp
//!
//!   # Use an installed binary and a shorter timeout
//!   cargo run -p repomix-mcp -- --command repomix --timeout-secs 120
//!
//! Test with MCP inspector:
//!   npx @modelcontextprotocol/inspector cargo run -p repomix-mcp

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rmcp::{ServiceExt, transport::stdio};
use tracing_subscriber::{EnvFilter, fmt};

use repomix_mcp::{AccessGuard, RepomixMcp, RunnerConfig, runner};

/// MCP server exposing repomix.
#[derive(Parser, Debug)]
#[command(name = "repomix-mcp")]
#[command(about = "MCP server for packing codebases with repomix")]
struct Args {
    /// Base repomix invocation, split with shell quoting rules
    #[arg(long, env = "REPOMIX_MCP_COMMAND", default_value = runner::DEFAULT_COMMAND)]
    command: String,

    /// Kill repomix after this many seconds (0 = no limit)
    #[arg(long, env = "REPOMIX_MCP_TIMEOUT_SECS", default_value_t = runner::DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Refuse to return `pack` output larger than this (0 = no limit)
    #[arg(long, env = "REPOMIX_MCP_MAX_OUTPUT_BYTES", default_value_t = runner::DEFAULT_MAX_OUTPUT_BYTES)]
    max_output_bytes: u64,
}

impl Args {
    fn runner_config(&self) -> Result<RunnerConfig> {
        let config = RunnerConfig::new(&self.command)
            .with_context(|| format!("invalid --command {:?}", self.command))?
            .with_timeout((self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)))
            .with_max_output_bytes((self.max_output_bytes > 0).then_some(self.max_output_bytes));
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing to stderr (MCP uses stdio for protocol)
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();
    let config = args.runner_config()?;
    let guard = AccessGuard::from_current_dir().context("failed to read working directory")?;

    tracing::info!(
        root = %guard.root().display(),
        command = %args.command,
        timeout_secs = args.timeout_secs,
        max_output_bytes = args.max_output_bytes,
        "Starting repomix-mcp"
    );

    // Create and serve the MCP server
    let service = RepomixMcp::new(guard, config)
        .serve(stdio())
        .await
        .inspect_err(|e| {
            tracing::error!("MCP server error: {:?}", e);
        })?;

    tracing::info!("repomix-mcp server ready");

    // Wait for the service to complete
    service.waiting().await?;

    tracing::info!("repomix-mcp server shutting down");
    Ok(())
}
