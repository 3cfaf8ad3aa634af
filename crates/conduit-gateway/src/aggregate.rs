//! Capability-catalog aggregation across every downstream server.
//!
//! Discovery is fanned out concurrently; each server succeeds or fails on its
//! own, and the merged catalog always lists every registered server.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::health::{HealthMonitor, HealthStatus};
use crate::registry::{DownstreamServer, Registry};

/// Whether a server contributed to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Unavailable,
}

/// One server's part of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerCatalog {
    /// Whether discovery succeeded.
    pub status: Availability,
    /// Number of tools discovered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_count: Option<usize>,
    /// Tools as the server reported them, original names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    /// Why discovery failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerCatalog {
    fn available(tools: Vec<Value>) -> Self {
        Self {
            status: Availability::Available,
            tool_count: Some(tools.len()),
            tools: Some(tools),
            error: None,
        }
    }

    fn unavailable(error: impl Into<String>) -> Self {
        Self {
            status: Availability::Unavailable,
            tool_count: None,
            tools: None,
            error: Some(error.into()),
        }
    }
}

/// Merged catalog of every registered server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedCatalog {
    /// Per-server results, keyed by server id.
    pub servers: BTreeMap<String, ServerCatalog>,
    /// Every discovered tool, renamed `{server}.{name}`.
    pub tools: Vec<Value>,
    /// `tools.len()`.
    pub total_tools: usize,
    /// Servers whose discovery succeeded.
    pub available_servers: usize,
    /// Servers whose discovery failed or that were skipped as unhealthy.
    pub unavailable_servers: usize,
}

/// Fans discovery out to every server and merges the results.
#[derive(Debug)]
pub struct Aggregator {
    client: reqwest::Client,
    registry: Arc<Registry>,
    health: Arc<HealthMonitor>,
}

impl Aggregator {
    /// Create an aggregator.
    pub fn new(client: reqwest::Client, registry: Arc<Registry>, health: Arc<HealthMonitor>) -> Self {
        Self {
            client,
            registry,
            health,
        }
    }

    /// Query every server concurrently and build the merged catalog.
    ///
    /// Never fails: a server that errors is reported `unavailable`.
    pub async fn collect(&self) -> AggregatedCatalog {
        let started = Instant::now();
        let results = join_all(self.registry.iter().map(|server| async move {
            (server.id.clone(), self.server_catalog(server).await)
        }))
        .await;

        let mut servers = BTreeMap::new();
        let mut tools = Vec::new();
        for (id, catalog) in results {
            if let Some(ref server_tools) = catalog.tools {
                tools.extend(server_tools.iter().filter_map(|t| namespace_tool(&id, t)));
            }
            servers.insert(id, catalog);
        }

        let available_servers = servers
            .values()
            .filter(|c| c.status == Availability::Available)
            .count();
        let unavailable_servers = servers.len() - available_servers;

        tracing::debug!(
            total_tools = tools.len(),
            available_servers,
            unavailable_servers,
            duration_ms = started.elapsed().as_millis() as u64,
            "catalog aggregated"
        );

        AggregatedCatalog {
            total_tools: tools.len(),
            tools,
            servers,
            available_servers,
            unavailable_servers,
        }
    }

    async fn server_catalog(&self, server: &DownstreamServer) -> ServerCatalog {
        if self.health.status(&server.id) == Some(HealthStatus::Unhealthy) {
            return ServerCatalog::unavailable("server is unhealthy");
        }
        match self.discover(server).await {
            Ok(tools) => ServerCatalog::available(tools),
            Err(error) => {
                tracing::warn!(server = %server.id, error = %error, "tool discovery failed");
                ServerCatalog::unavailable(error)
            }
        }
    }

    async fn discover(&self, server: &DownstreamServer) -> Result<Vec<Value>, String> {
        let response = self
            .client
            .get(server.discovery_url())
            .timeout(server.timeout)
            .send()
            .await
            .map_err(|e| describe(server, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("discovery returned HTTP {}", status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| format!("invalid discovery response: {}", e))?;
        extract_tools(body)
    }
}

fn describe(server: &DownstreamServer, error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("timed out after {}ms", server.timeout.as_millis())
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    }
}

/// Pull the tool list out of a discovery response.
///
/// Accepts `{"tools": [...]}`, a JSON-RPC envelope `{"result": {"tools": [...]}}`
/// or a bare array. Bare strings become `{"name": s}`; entries without a
/// string `name` are dropped.
pub fn extract_tools(body: Value) -> Result<Vec<Value>, String> {
    let list = match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => {
            if let Some(error) = obj.get("error").filter(|e| !e.is_null()) {
                return Err(format!("discovery returned an error: {}", error));
            }
            match obj.remove("tools") {
                Some(Value::Array(items)) => items,
                Some(_) => return Err("'tools' is not an array".to_string()),
                None => match obj.remove("result") {
                    Some(result) => return extract_tools(result),
                    None => return Err("response has no 'tools' list".to_string()),
                },
            }
        }
        _ => return Err("response is not a tool list".to_string()),
    };

    Ok(list
        .into_iter()
        .filter_map(|item| match item {
            Value::String(name) => {
                let mut obj = Map::new();
                obj.insert("name".to_string(), Value::String(name));
                Some(Value::Object(obj))
            }
            Value::Object(obj) if obj.get("name").is_some_and(Value::is_string) => {
                Some(Value::Object(obj))
            }
            _ => None,
        })
        .collect())
}

/// Rename a tool to `{server}.{name}`, recording `server` and `original_name`.
pub fn namespace_tool(server: &str, tool: &Value) -> Option<Value> {
    let mut obj = tool.as_object()?.clone();
    let original = obj.get("name")?.as_str()?.to_string();
    obj.insert("name".to_string(), Value::String(format!("{}.{}", server, original)));
    obj.insert("server".to_string(), Value::String(server.to_string()));
    obj.insert("original_name".to_string(), Value::String(original));
    Some(Value::Object(obj))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_tools_shapes() {
        let plain = extract_tools(json!({"tools": [{"name": "search"}]})).unwrap();
        assert_eq!(plain, vec![json!({"name": "search"})]);

        let envelope = extract_tools(json!({
            "jsonrpc": "2.0", "id": 1,
            "result": {"tools": [{"name": "a"}, {"name": "b"}]}
        }))
        .unwrap();
        assert_eq!(envelope.len(), 2);

        let bare = extract_tools(json!(["x", {"name": "y", "description": "d"}])).unwrap();
        assert_eq!(bare, vec![json!({"name": "x"}), json!({"name": "y", "description": "d"})]);
    }

    #[test]
    fn test_extract_tools_drops_nameless_entries() {
        let tools = extract_tools(json!({"tools": [{"name": 3}, {"desc": "x"}, 42, {"name": "ok"}]}))
            .unwrap();
        assert_eq!(tools, vec![json!({"name": "ok"})]);
    }

    #[test]
    fn test_extract_tools_errors() {
        assert!(extract_tools(json!("nope")).is_err());
        assert!(extract_tools(json!({"tools": "x"})).is_err());
        assert!(extract_tools(json!({"other": []})).is_err());
        let err = extract_tools(json!({"error": {"code": -1, "message": "down"}})).unwrap_err();
        assert!(err.contains("down"));
    }

    #[test]
    fn test_namespace_tool() {
        let tool = json!({"name": "search", "description": "Find things"});
        let renamed = namespace_tool("alpha", &tool).unwrap();
        assert_eq!(
            renamed,
            json!({
                "name": "alpha.search",
                "description": "Find things",
                "server": "alpha",
                "original_name": "search"
            })
        );
        assert!(namespace_tool("alpha", &json!("search")).is_none());
    }

    #[test]
    fn test_catalog_serialization_skips_empty_fields() {
        let catalog = ServerCatalog::unavailable("boom");
        let json = serde_json::to_value(&catalog).unwrap();
        assert_eq!(json, json!({"status": "unavailable", "error": "boom"}));

        let catalog = ServerCatalog::available(vec![json!({"name": "t"})]);
        let json = serde_json::to_value(&catalog).unwrap();
        assert_eq!(json["status"], "available");
        assert_eq!(json["tool_count"], 1);
        assert!(json.get("error").is_none());
    }
}
