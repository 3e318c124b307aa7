//! Daemon entry point for the erdscope MCP server.
//!
//! Loads configuration from flags and the environment, builds the connection
//! manager and render dispatch, and serves MCP over stdio or streamable HTTP.

mod config;
mod runtime;

use erdscope_mcp::server::{serve_stdio, serve_streamable_http};
use tracing::info;

use crate::config::{ErdscopeConfig, Transport};
use crate::runtime::{build_control_plane, http_config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = ErdscopeConfig::from_args()?;

    // stdout belongs to the stdio transport.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!(
        transport = ?config.transport,
        output_dir = %config.output_dir.display(),
        "starting erdscope-mcpd"
    );

    let control = build_control_plane(&config);
    match config.transport {
        Transport::Stdio => serve_stdio(control).await,
        Transport::Http => serve_streamable_http(control, http_config(&config)).await,
    }
}
