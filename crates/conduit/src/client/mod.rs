//! HTTP client for a running Conduit gateway.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Health check response from the gateway.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(default)]
    pub uptime_seconds: u64,
    #[serde(default)]
    pub requests: u64,
    #[serde(default)]
    pub servers: BTreeMap<String, ServerHealth>,
}

/// Health of one downstream server.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerHealth {
    pub status: String,
    #[serde(default)]
    pub last_checked: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

/// Aggregated tool catalog.
#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogResponse {
    #[serde(default)]
    pub servers: BTreeMap<String, ServerCatalog>,
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(default)]
    pub total_tools: usize,
    #[serde(default)]
    pub available_servers: usize,
    #[serde(default)]
    pub unavailable_servers: usize,
}

/// One server's part of the catalog.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerCatalog {
    pub status: String,
    #[serde(default)]
    pub tool_count: Option<usize>,
    #[serde(default)]
    pub error: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Gateway API client.
pub struct Client {
    base_url: Url,
    http: reqwest::Client,
}

impl Client {
    /// Create a new client for the given gateway URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid server URL '{}'", base_url))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { base_url, http })
    }

    /// Check gateway health.
    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_json("/health").await
    }

    /// Fetch the aggregated tool catalog.
    pub async fn catalog(&self) -> Result<CatalogResponse> {
        self.get_json("/mcp/get_methods").await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path)?;
        let response = self.http.get(url).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Server returned error: {}", response.status());
        }

        Ok(response.json().await?)
    }
}
