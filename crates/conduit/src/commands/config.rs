//! Config command - inspect configuration.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use super::{Context, describe_servers, load_effective_config};

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration after files and environment overrides
    Show {
        /// Path to config file (overrides default discovery)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show configuration file paths
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show { config } => cmd_show(config, ctx),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(path: Option<PathBuf>, ctx: &Context) -> Result<()> {
    let loaded = load_effective_config(path.as_deref(), ctx)?;
    let config = &loaded.config;

    if ctx.json_output {
        let output = serde_json::json!({
            "sources": loaded.loaded_from(),
            "warnings": loaded.warnings,
            "config": config,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("# Conduit Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    println!("Servers: {}\n", describe_servers(config));

    if let Err(e) = config.validate() {
        println!("Invalid: {}\n", e);
    }

    println!("{}", config.to_toml()?);
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let user = conduit_config::xdg_config_path();
    let project = std::env::current_dir()
        .map(|d| d.join("conduit.toml"))
        .unwrap_or_else(|_| PathBuf::from("conduit.toml"));

    if ctx.json_output {
        let output = serde_json::json!({
            "user": user,
            "project": project,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match user {
        Some(path) => println!("{}", path.display()),
        None => eprintln!("Could not determine config directory"),
    }
    println!("{}", project.display());
    Ok(())
}
