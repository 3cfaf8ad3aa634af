//! Bridge command - exposes a stdio JSON-RPC subprocess over HTTP.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use conduit_config::{BridgeConfig, ConfigError};
use conduit_server::BridgeServer;
use console::style;

use super::{Context, load_effective_config, parse_key_value};

/// Arguments for the bridge command.
///
/// The subprocess command comes after `--`; without one, the `[bridge]`
/// section of the config is used.
#[derive(Args, Debug, Default)]
pub struct BridgeArgs {
    /// Path to config file (overrides default discovery)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Per-call timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Handshake timeout in seconds
    #[arg(long)]
    pub startup_timeout: Option<u64>,

    /// Working directory for the subprocess
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Extra environment variable for the subprocess as KEY=VALUE (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Subprocess command and its arguments
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Run the bridge command.
pub async fn run(args: BridgeArgs, ctx: &Context) -> Result<()> {
    let loaded = load_effective_config(args.config.as_deref(), ctx)?;
    let bridge_config = resolve_bridge_config(loaded.config.bridge, &args)?;

    let server = BridgeServer::from_config(&bridge_config)?;

    if !ctx.json_output {
        println!(
            "{} listening on {}",
            style("conduit bridge").bold(),
            style(server.bind_address()).cyan()
        );
        println!(
            "  command: {} {}",
            bridge_config.command,
            bridge_config.args.join(" ")
        );
    }

    server.run().await?;
    Ok(())
}

/// Merge the `[bridge]` section with command-line arguments.
///
/// A command given on the command line replaces the configured command and
/// its arguments; environment and working directory from the config are kept.
pub fn resolve_bridge_config(
    configured: Option<BridgeConfig>,
    args: &BridgeArgs,
) -> Result<BridgeConfig, ConfigError> {
    let mut config = match (configured, args.command.split_first()) {
        (Some(mut config), Some((command, rest))) => {
            config.command = command.clone();
            config.args = rest.to_vec();
            config
        }
        (None, Some((command, rest))) => BridgeConfig {
            args: rest.to_vec(),
            ..BridgeConfig::new(command.clone())
        },
        (Some(config), None) => config,
        (None, None) => return Err(ConfigError::MissingBridgeCommand),
    };

    if let Some(ref bind) = args.bind {
        config.bind = bind.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(timeout) = args.timeout {
        config.call_timeout_secs = timeout;
    }
    if let Some(timeout) = args.startup_timeout {
        config.startup_timeout_secs = timeout;
    }
    if let Some(ref cwd) = args.cwd {
        config.cwd = Some(cwd.clone());
    }
    for (key, value) in &args.env {
        config.env.retain(|[k, _]| k != key);
        config.env.push([key.clone(), value.clone()]);
    }

    config.validate()?;
    Ok(config)
}
