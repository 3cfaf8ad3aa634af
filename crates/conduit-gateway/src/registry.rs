//! Static registry of downstream servers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use conduit_config::{ConduitConfig, DownstreamEntry};

use crate::Result;

/// A downstream server the gateway can route to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamServer {
    /// Unique id; routing target and tool namespace.
    pub id: String,
    /// Base URL without a trailing slash.
    pub url: String,
    /// Human-readable description.
    pub description: String,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Path polled by the health monitor.
    pub health_path: String,
    /// Path queried for capability discovery.
    pub discovery_path: String,
}

impl DownstreamServer {
    /// Build from a config entry, resolving the timeout against `global`.
    pub fn from_entry(entry: &DownstreamEntry, global: Duration) -> Self {
        Self {
            id: entry.id.clone(),
            url: entry.url.trim_end_matches('/').to_string(),
            description: entry.description.clone(),
            timeout: entry.effective_timeout(global),
            health_path: entry.health_path.clone(),
            discovery_path: entry.discovery_path.clone(),
        }
    }

    /// Absolute URL for `path` on this server.
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.url, path)
        } else {
            format!("{}/{}", self.url, path)
        }
    }

    /// Health-check URL.
    pub fn health_url(&self) -> String {
        self.endpoint(&self.health_path)
    }

    /// Discovery URL.
    pub fn discovery_url(&self) -> String {
        self.endpoint(&self.discovery_path)
    }
}

/// Immutable map of server id to server, iterated in id order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    servers: BTreeMap<String, Arc<DownstreamServer>>,
}

impl Registry {
    /// Build from the `[[servers]]` entries of a configuration.
    pub fn from_config(config: &ConduitConfig) -> Result<Self> {
        config.validate()?;
        let global = config.gateway_or_default().timeout();
        Ok(Self::from_servers(
            config
                .servers
                .iter()
                .map(|entry| DownstreamServer::from_entry(entry, global)),
        ))
    }

    /// Build from already-resolved servers. Later duplicates replace earlier ones.
    pub fn from_servers(servers: impl IntoIterator<Item = DownstreamServer>) -> Self {
        let servers = servers
            .into_iter()
            .map(|s| (s.id.clone(), Arc::new(s)))
            .collect();
        Self { servers }
    }

    /// Look up a server by id.
    pub fn get(&self, id: &str) -> Option<&Arc<DownstreamServer>> {
        self.servers.get(id)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.servers.contains_key(id)
    }

    /// All ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    /// All servers, sorted by id.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<DownstreamServer>> {
        self.servers.values()
    }

    /// Number of servers.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Whether no servers are registered.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
