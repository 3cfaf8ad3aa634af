//! Status command - shows a running gateway's health.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use super::Context;
use crate::client::{Client, HealthResponse};

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show per-server health
    #[arg(short, long)]
    pub detailed: bool,
}

/// Status response for JSON output.
#[derive(Debug, Serialize)]
struct StatusOutput<'a> {
    running: bool,
    server_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    health: Option<&'a HealthResponse>,
}

/// Run the status command.
pub async fn run(args: StatusArgs, ctx: &Context) -> Result<()> {
    let client = Client::new(&ctx.server_url)?;

    match client.health().await {
        Ok(health) => {
            if ctx.json_output {
                let output = StatusOutput {
                    running: true,
                    server_url: ctx.server_url.clone(),
                    health: Some(&health),
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_health(&health, args.detailed, ctx);
            }
        }
        Err(e) => {
            if ctx.json_output {
                let output = StatusOutput {
                    running: false,
                    server_url: ctx.server_url.clone(),
                    health: None,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                let red = Style::new().red();
                let dim = Style::new().dim();

                println!();
                println!("{}", style("Conduit Gateway Status").bold());
                println!("{}", dim.apply_to("─".repeat(40)));
                println!();
                println!("  {} {}", dim.apply_to("Status:"), red.apply_to("● not running"));
                println!("  {} {}", dim.apply_to("Server:"), ctx.server_url);

                if ctx.verbose {
                    println!();
                    println!("  {} {}", dim.apply_to("Error:"), e);
                }

                println!();
                println!("  {}", dim.apply_to("Start the gateway with: conduit gateway"));
                println!();
            }
        }
    }

    Ok(())
}

fn print_health(health: &HealthResponse, detailed: bool, ctx: &Context) {
    let dim = Style::new().dim();
    let state = if health.status == "ok" {
        Style::new().green().apply_to("● running")
    } else {
        Style::new().yellow().apply_to("● degraded")
    };

    println!();
    println!("{}", style("Conduit Gateway Status").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("Status:"), state);
    println!("  {} {}", dim.apply_to("Version:"), health.version);
    println!("  {} {}", dim.apply_to("Server:"), ctx.server_url);
    println!("  {} {}s", dim.apply_to("Uptime:"), health.uptime_seconds);
    println!("  {} {}", dim.apply_to("Requests:"), health.requests);

    let unhealthy = health
        .servers
        .values()
        .filter(|s| s.status == "unhealthy")
        .count();
    println!(
        "  {} {} ({} unhealthy)",
        dim.apply_to("Downstreams:"),
        health.servers.len(),
        unhealthy
    );

    if detailed && !health.servers.is_empty() {
        println!();
        println!("{}", dim.apply_to("─".repeat(40)));
        println!();
        for (id, server) in &health.servers {
            let status = match server.status.as_str() {
                "healthy" => Style::new().green().apply_to(server.status.as_str()),
                "unhealthy" => Style::new().red().apply_to(server.status.as_str()),
                _ => Style::new().dim().apply_to(server.status.as_str()),
            };
            let latency = server
                .latency_ms
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_else(|| "-".to_string());
            println!("  {:<16} {:<10} {}", id, status, dim.apply_to(latency));
            if let Some(ref error) = server.last_error {
                println!("  {:<16} {}", "", dim.apply_to(error));
            }
        }
    }

    println!();
}
