use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mssql_mcp_core::config::ConnectionProfile;
use mssql_mcp_core::protocol::ServerInfo;
use mssql_mcp_server::{McpServer, SqlServerTools};

/// MCP server exposing Microsoft SQL Server as LLM-callable tools.
#[derive(Debug, Parser)]
#[command(name = "mssql-mcp-server", version, about)]
struct Cli {
    /// JSON configuration file; environment variables override its values.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is not set, e.g. "info" or "mssql_mcp=debug".
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let profile = ConnectionProfile::load(cli.config.as_deref())
        .context("failed to load configuration")?;
    info!(
        mode = %profile.mode,
        max_sessions = profile.max_concurrent_sessions,
        "starting mssql-mcp-server"
    );

    let cleanup_interval = Duration::from_secs(profile.session_cleanup_interval_minutes * 60);
    let tools = Arc::new(SqlServerTools::new(profile));
    let reaper = tools.session_manager().spawn_reaper(cleanup_interval);

    let server = McpServer::new(
        ServerInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: Some(env!("CARGO_PKG_DESCRIPTION").to_string()),
        },
        tools,
    );

    let outcome = server.run_stdio().await;
    reaper.abort();
    outcome.context("server loop failed")
}
