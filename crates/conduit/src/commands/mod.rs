//! CLI command handlers.

pub mod bridge;
pub mod catalog;
pub mod config;
pub mod gateway;
pub mod status;

use std::path::Path;

use anyhow::{Context as _, Result};
use conduit_config::{ConduitConfig, ConfigSource, LoadedConfig};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Gateway URL to connect to.
    pub server_url: String,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Load config files, then apply `CONDUIT_*` environment overrides.
///
/// An explicit `path` replaces file discovery. Warnings are printed to stderr.
pub fn load_effective_config(path: Option<&Path>, ctx: &Context) -> Result<LoadedConfig> {
    let mut loaded = match path {
        Some(path) => {
            let config = conduit_config::load_config_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            LoadedConfig {
                config,
                sources: vec![ConfigSource {
                    path: path.to_path_buf(),
                    loaded: true,
                }],
                warnings: Vec::new(),
            }
        }
        None => conduit_config::load_config(None)?,
    };

    let env_warnings = conduit_config::apply_env_overrides(&mut loaded.config, std::env::vars())?;
    loaded.warnings.extend(env_warnings);

    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }

    if ctx.verbose {
        let sources = loaded.loaded_from();
        if sources.is_empty() {
            eprintln!("No config files found, using defaults + CLI args");
        } else {
            for source in sources {
                eprintln!("Loaded config: {}", source.display());
            }
        }
    }

    Ok(loaded)
}

/// Parse a `KEY=VALUE` pair.
pub fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// Server ids in the config, for messages.
pub fn describe_servers(config: &ConduitConfig) -> String {
    let ids = config.server_ids();
    if ids.is_empty() {
        "(none)".to_string()
    } else {
        ids.join(", ")
    }
}
