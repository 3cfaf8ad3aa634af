//! Conduit - tool-server routing gateway and stdio JSON-RPC bridge
//!
//! Main entry point for the Conduit CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod client;
mod commands;

use commands::{bridge, catalog, config, gateway, status};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Conduit - route tool calls to downstream servers and bridge stdio JSON-RPC to HTTP
#[derive(Parser)]
#[command(name = "conduit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Gateway URL for client commands (default: http://localhost:8000)
    #[arg(long, global = true, env = "CONDUIT_SERVER_URL")]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the routing gateway
    Gateway(gateway::GatewayArgs),

    /// Expose a stdio JSON-RPC server over HTTP
    Bridge(bridge::BridgeArgs),

    /// Show a running gateway's health
    Status(status::StatusArgs),

    /// Show the merged tool catalog of a running gateway
    Catalog(catalog::CatalogArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing: console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "conduit=debug,conduit_server=debug,conduit_gateway=debug,conduit_bridge=debug,conduit_config=debug,tower_http=debug,info"
    } else {
        "conduit=info,conduit_server=info,conduit_gateway=info,conduit_bridge=info,warn"
    };
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let log_dir = conduit_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "conduit.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(
                    "conduit=trace,conduit_server=trace,conduit_gateway=trace,conduit_bridge=trace,conduit_config=trace,info",
                )),
        )
        .init();

    let server_url = cli
        .server
        .unwrap_or_else(|| "http://localhost:8000".to_string());

    let ctx = commands::Context {
        server_url,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Gateway(args) => gateway::run(args, &ctx).await,
        Commands::Bridge(args) => bridge::run(args, &ctx).await,
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Catalog(args) => catalog::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
