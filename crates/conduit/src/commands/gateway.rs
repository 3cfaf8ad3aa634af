//! Gateway command - runs the routing gateway.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use conduit_config::{ConduitConfig, DownstreamEntry, GatewayConfig, RoutingStrategy};
use conduit_server::GatewayServer;
use console::style;

use super::{Context, describe_servers, load_effective_config, parse_key_value};

/// Arguments for the gateway command.
///
/// CLI arguments override config file and environment values.
#[derive(Args, Debug, Default)]
pub struct GatewayArgs {
    /// Path to config file (overrides default discovery)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Routing strategy: prefix or header (overrides config)
    #[arg(long)]
    pub strategy: Option<RoutingStrategy>,

    /// Fallback target for the header strategy
    #[arg(long)]
    pub default_target: Option<String>,

    /// Global per-call timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Seconds between health polls
    #[arg(long)]
    pub health_interval: Option<u64>,

    /// Downstream server as ID=URL; replaces the URL of an existing id (repeatable)
    #[arg(long = "downstream", value_name = "ID=URL", value_parser = parse_key_value)]
    pub downstreams: Vec<(String, String)>,
}

/// Run the gateway command.
pub async fn run(args: GatewayArgs, ctx: &Context) -> Result<()> {
    let loaded = load_effective_config(args.config.as_deref(), ctx)?;
    let mut config = loaded.config;
    apply_overrides(&mut config, &args);
    config.validate()?;

    if config.servers.is_empty() {
        bail!("no downstream servers configured; add [[servers]] entries or pass --downstream ID=URL");
    }

    let server = GatewayServer::from_config(&config)?;
    let settings = server.gateway().settings().clone();

    if !ctx.json_output {
        println!(
            "{} listening on {}",
            style("conduit gateway").bold(),
            style(server.bind_address()).cyan()
        );
        println!("  strategy: {}", settings.routing_strategy);
        println!("  servers:  {}", describe_servers(&config));
        if let Some(ref target) = settings.default_target {
            println!("  default:  {}", target);
        }
    }

    server.run().await?;
    Ok(())
}

/// Apply command-line overrides on top of the loaded configuration.
pub fn apply_overrides(config: &mut ConduitConfig, args: &GatewayArgs) {
    let gateway = config.gateway.get_or_insert_with(GatewayConfig::default);

    if let Some(ref bind) = args.bind {
        gateway.bind = bind.clone();
    }
    if let Some(port) = args.port {
        gateway.port = port;
    }
    if let Some(strategy) = args.strategy {
        gateway.routing_strategy = strategy;
    }
    if let Some(ref target) = args.default_target {
        gateway.default_target = Some(target.clone());
    }
    if let Some(timeout) = args.timeout {
        gateway.timeout_secs = timeout;
    }
    if let Some(interval) = args.health_interval {
        gateway.health_interval_secs = interval;
    }

    for (id, url) in &args.downstreams {
        match config.servers.iter_mut().find(|s| s.id == *id) {
            Some(existing) => existing.url = url.clone(),
            None => config.servers.push(DownstreamEntry::new(id.clone(), url.clone())),
        }
    }
}
