//! Catalog command - lists the merged tool catalog of a running gateway.

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, style};
use serde_json::Value;

use super::Context;
use crate::client::{CatalogResponse, Client};

/// Arguments for the catalog command.
#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Only show tools from this downstream server
    #[arg(long, value_name = "ID")]
    pub only: Option<String>,
}

/// Run the catalog command.
pub async fn run(args: CatalogArgs, ctx: &Context) -> Result<()> {
    let client = Client::new(&ctx.server_url)?;
    let catalog = client
        .catalog()
        .await
        .with_context(|| format!("failed to fetch catalog from {}", ctx.server_url))?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    print_catalog(&catalog, args.only.as_deref());
    Ok(())
}

fn print_catalog(catalog: &CatalogResponse, only: Option<&str>) {
    let dim = Style::new().dim();

    println!();
    println!(
        "{} {} tools from {} servers ({} unavailable)",
        style("Tool Catalog").bold(),
        catalog.total_tools,
        catalog.available_servers,
        catalog.unavailable_servers
    );
    println!("{}", dim.apply_to("─".repeat(40)));

    for (id, server) in &catalog.servers {
        if only.is_some_and(|o| o != id) {
            continue;
        }

        println!();
        if server.status == "available" {
            println!(
                "  {} {}",
                style(id).cyan().bold(),
                dim.apply_to(format!("({} tools)", server.tool_count.unwrap_or(0)))
            );
        } else {
            println!(
                "  {} {}",
                style(id).cyan().bold(),
                Style::new().red().apply_to("unavailable")
            );
            if let Some(ref error) = server.error {
                println!("    {}", dim.apply_to(error));
            }
            continue;
        }

        for tool in catalog.tools.iter().filter(|t| tool_server(t) == Some(id)) {
            let name = tool.get("name").and_then(Value::as_str).unwrap_or("?");
            match tool.get("description").and_then(Value::as_str) {
                Some(description) => println!("    {:<32} {}", name, dim.apply_to(description)),
                None => println!("    {}", name),
            }
        }
    }

    println!();
}

fn tool_server(tool: &Value) -> Option<&str> {
    tool.get("server").and_then(Value::as_str)
}
