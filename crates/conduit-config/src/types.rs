//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [gateway]                # gateway listener, routing strategy, timeouts
//! [[servers]]              # downstream registry entries
//! [bridge]                 # stdio subprocess exposed over HTTP
//! ```

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Default values shared by the config sections and the CLI.
pub mod defaults {
    /// Default gateway port.
    pub const GATEWAY_PORT: u16 = 8000;
    /// Default bridge port.
    pub const BRIDGE_PORT: u16 = 8100;
    /// Default bind address.
    pub const BIND: &str = "127.0.0.1";
    /// Default per-call timeout for forwarded requests, in seconds.
    pub const TIMEOUT_SECS: u64 = 30;
    /// Default interval between health polls, in seconds.
    pub const HEALTH_INTERVAL_SECS: u64 = 30;
    /// Default health probe timeout, in seconds.
    pub const HEALTH_TIMEOUT_SECS: u64 = 2;
    /// Default health-check path on downstream servers.
    pub const HEALTH_PATH: &str = "/health";
    /// Default capability-discovery path on downstream servers.
    pub const DISCOVERY_PATH: &str = "/tools";
    /// Default bridge call timeout, in seconds.
    pub const CALL_TIMEOUT_SECS: u64 = 30;
    /// Default bridge handshake timeout, in seconds.
    pub const STARTUP_TIMEOUT_SECS: u64 = 10;
    /// Default maximum NDJSON line size accepted from a subprocess (10 MB).
    pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;
}

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConduitConfig {
    /// Gateway settings.
    pub gateway: Option<GatewayConfig>,

    /// Downstream server registry.
    pub servers: Vec<DownstreamEntry>,

    /// Stdio bridge settings.
    pub bridge: Option<BridgeConfig>,
}

impl ConduitConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced wholesale; servers are merged by id, with entries
    /// from `other` replacing same-id entries and new ids appended.
    pub fn merge(&mut self, other: ConduitConfig) {
        if other.gateway.is_some() {
            self.gateway = other.gateway;
        }

        if other.bridge.is_some() {
            self.bridge = other.bridge;
        }

        for entry in other.servers {
            match self.servers.iter_mut().find(|s| s.id == entry.id) {
                Some(existing) => *existing = entry,
                None => self.servers.push(entry),
            }
        }
    }

    /// The gateway section, or defaults when absent.
    pub fn gateway_or_default(&self) -> GatewayConfig {
        self.gateway.clone().unwrap_or_default()
    }

    /// Look up a server entry by id.
    pub fn server(&self, id: &str) -> Option<&DownstreamEntry> {
        self.servers.iter().find(|s| s.id == id)
    }

    /// Ids of all configured servers, in declaration order.
    pub fn server_ids(&self) -> Vec<&str> {
        self.servers.iter().map(|s| s.id.as_str()).collect()
    }

    /// Validate the gateway section and the server registry.
    pub fn validate(&self) -> Result<()> {
        let gateway = self.gateway_or_default();
        gateway.validate()?;

        let mut seen = HashSet::new();
        for entry in &self.servers {
            entry.validate()?;
            if !seen.insert(entry.id.as_str()) {
                return Err(ConfigError::DuplicateServer(entry.id.clone()));
            }
        }

        if let Some(ref target) = gateway.default_target
            && !seen.contains(target.as_str())
        {
            return Err(ConfigError::UnknownDefaultTarget(target.clone()));
        }

        if let Some(ref bridge) = self.bridge {
            bridge.validate()?;
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// How the gateway decides which downstream server handles a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingStrategy {
    /// Target is the path segment after `/proxy/`.
    #[default]
    Prefix,
    /// Target is read from the `X-Target-MCP` header.
    Header,
}

impl RoutingStrategy {
    /// Lowercase name as used in config files and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prefix => "prefix",
            Self::Header => "header",
        }
    }
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefix" | "path" => Ok(Self::Prefix),
            "header" => Ok(Self::Header),
            other => Err(ConfigError::invalid(
                "routing_strategy",
                format!("expected 'prefix' or 'header', got '{}'", other),
            )),
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// Routing strategy, fixed for the lifetime of the process.
    pub routing_strategy: RoutingStrategy,
    /// Target used under the header strategy when the header is absent.
    pub default_target: Option<String>,
    /// Global default per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Interval between health polls in seconds.
    pub health_interval_secs: u64,
    /// Health probe timeout in seconds.
    pub health_timeout_secs: u64,
    /// Enable request logging.
    pub request_logging: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: defaults::BIND.to_string(),
            port: defaults::GATEWAY_PORT,
            routing_strategy: RoutingStrategy::default(),
            default_target: None,
            timeout_secs: defaults::TIMEOUT_SECS,
            health_interval_secs: defaults::HEALTH_INTERVAL_SECS,
            health_timeout_secs: defaults::HEALTH_TIMEOUT_SECS,
            request_logging: true,
        }
    }
}

impl GatewayConfig {
    /// Global default per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Interval between health polls.
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    /// Health probe timeout.
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    /// Socket address to listen on.
    pub fn bind_address(&self) -> Result<SocketAddr> {
        socket_addr("gateway.bind", &self.bind, self.port)
    }

    fn validate(&self) -> Result<()> {
        require_nonzero("gateway.timeout_secs", self.timeout_secs)?;
        require_nonzero("gateway.health_interval_secs", self.health_interval_secs)?;
        require_nonzero("gateway.health_timeout_secs", self.health_timeout_secs)?;
        self.bind_address()?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Downstream Servers
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for a single downstream server.
///
/// ```toml
/// [[servers]]
/// id = "alpha"
/// url = "http://localhost:8001"
/// description = "Alpha tools"
/// timeout_secs = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamEntry {
    /// Unique identifier, used as the routing target and tool namespace.
    pub id: String,
    /// Base URL of the server.
    pub url: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Per-call timeout in seconds. Falls back to `gateway.timeout_secs`.
    pub timeout_secs: Option<u64>,
    /// Path polled by the health monitor.
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Path queried for capability discovery.
    #[serde(default = "default_discovery_path")]
    pub discovery_path: String,
}

fn default_health_path() -> String {
    defaults::HEALTH_PATH.to_string()
}

fn default_discovery_path() -> String {
    defaults::DISCOVERY_PATH.to_string()
}

impl DownstreamEntry {
    /// Create a new entry with default paths.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            description: String::new(),
            timeout_secs: None,
            health_path: default_health_path(),
            discovery_path: default_discovery_path(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the per-call timeout in seconds.
    pub fn with_timeout_secs(mut self, timeout: u64) -> Self {
        self.timeout_secs = Some(timeout);
        self
    }

    /// Set the health-check path.
    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    /// Set the discovery path.
    pub fn with_discovery_path(mut self, path: impl Into<String>) -> Self {
        self.discovery_path = path.into();
        self
    }

    /// Effective per-call timeout given the global default.
    pub fn effective_timeout(&self, global: Duration) -> Duration {
        self.timeout_secs.map(Duration::from_secs).unwrap_or(global)
    }

    fn validate(&self) -> Result<()> {
        let field = format!("servers.{}", self.id);

        if self.id.trim().is_empty() {
            return Err(ConfigError::invalid("servers.id", "server id must not be empty"));
        }
        if self.id.contains('/') || self.id.chars().any(char::is_whitespace) {
            return Err(ConfigError::invalid(
                format!("{}.id", field),
                "server id must not contain '/' or whitespace",
            ));
        }

        let parsed = url::Url::parse(&self.url)
            .map_err(|e| ConfigError::invalid(format!("{}.url", field), e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                format!("{}.url", field),
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }

        if let Some(timeout) = self.timeout_secs {
            require_nonzero(&format!("{}.timeout_secs", field), timeout)?;
        }
        for (name, path) in [
            ("health_path", &self.health_path),
            ("discovery_path", &self.discovery_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::invalid(
                    format!("{}.{}", field, name),
                    "path must start with '/'",
                ));
            }
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bridge Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the stdio bridge.
///
/// ```toml
/// [bridge]
/// command = "python"
/// args = ["-m", "my_server"]
/// env = [["DEBUG", "1"]]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Command to spawn.
    pub command: String,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Environment variables to set (as [key, value] pairs).
    pub env: Vec<[String; 2]>,
    /// Working directory for the subprocess.
    pub cwd: Option<PathBuf>,
    /// Address to bind the bridge's HTTP listener to.
    pub bind: String,
    /// Port for the bridge's HTTP listener.
    pub port: u16,
    /// Per-call timeout in seconds.
    pub call_timeout_secs: u64,
    /// Handshake timeout in seconds.
    pub startup_timeout_secs: u64,
    /// Maximum accepted line length from the subprocess, in bytes.
    pub max_line_bytes: usize,
    /// Enable request logging.
    pub request_logging: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            bind: defaults::BIND.to_string(),
            port: defaults::BRIDGE_PORT,
            call_timeout_secs: defaults::CALL_TIMEOUT_SECS,
            startup_timeout_secs: defaults::STARTUP_TIMEOUT_SECS,
            max_line_bytes: defaults::MAX_LINE_BYTES,
            request_logging: true,
        }
    }
}

impl BridgeConfig {
    /// Create a bridge config for the given command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push([key.into(), value.into()]);
        self
    }

    /// Convert environment variables to tuples.
    pub fn env_tuples(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .map(|[k, v]| (k.clone(), v.clone()))
            .collect()
    }

    /// Per-call timeout.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Handshake timeout.
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Socket address to listen on.
    pub fn bind_address(&self) -> Result<SocketAddr> {
        socket_addr("bridge.bind", &self.bind, self.port)
    }

    /// Validate the section.
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(ConfigError::MissingBridgeCommand);
        }
        require_nonzero("bridge.call_timeout_secs", self.call_timeout_secs)?;
        require_nonzero("bridge.startup_timeout_secs", self.startup_timeout_secs)?;
        if self.max_line_bytes == 0 {
            return Err(ConfigError::invalid("bridge.max_line_bytes", "must be non-zero"));
        }
        self.bind_address()?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn require_nonzero(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    Ok(())
}

fn socket_addr(field: &str, bind: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = bind
        .parse()
        .map_err(|e| ConfigError::invalid(field, format!("'{}': {}", bind, e)))?;
    Ok(SocketAddr::new(ip, port))
}
