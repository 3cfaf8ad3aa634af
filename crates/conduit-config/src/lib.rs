//! Configuration system for Conduit.
//!
//! Provides TOML-based configuration with:
//! - A `[gateway]` section (bind address, routing strategy, timeouts, health polling)
//! - A `[[servers]]` array describing the downstream registry
//! - A `[bridge]` section describing the stdio subprocess to expose over HTTP
//! - Config file layering (user config dir + project-local overrides)
//! - Environment variable overrides (`CONDUIT_*`)
//!
//! Resolution order, lowest precedence first: user config, `./conduit.toml`,
//! environment, then CLI flags (applied by the binary).

pub mod discovery;
pub mod env;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    xdg_config_dir, xdg_config_path,
};
pub use env::{apply_env_overrides, server_url_var};
pub use error::{ConfigError, Result};
pub use types::*;
