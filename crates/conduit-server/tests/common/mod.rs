//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use conduit_bridge::{Bridge, ProcessConfig};
use conduit_config::{ConduitConfig, DownstreamEntry};
use conduit_server::{BridgeServer, GatewayServer, ServerConfig};
use reqwest::Client;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// A downstream tool server.
pub struct Downstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    _handle: JoinHandle<()>,
}

#[derive(Clone)]
struct DownstreamState {
    healthy: bool,
    tools: Vec<&'static str>,
    hits: Arc<AtomicUsize>,
}

impl Downstream {
    /// Start a server whose `/health` answers 200 (or 500) and whose `/tools`
    /// lists `tools`.
    pub async fn start(healthy: bool, tools: &[&'static str]) -> Result<Self> {
        let hits = Arc::new(AtomicUsize::new(0));
        let state = DownstreamState {
            healthy,
            tools: tools.to_vec(),
            hits: Arc::clone(&hits),
        };
        let app = Router::new()
            .route("/health", get(downstream_health))
            .route("/tools", get(downstream_tools))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self {
            addr,
            hits,
            _handle: handle,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received on anything but `/health`.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn downstream_health(State(state): State<DownstreamState>) -> Response {
    if state.healthy {
        axum::Json(json!({"status": "ok"})).into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "unhealthy").into_response()
    }
}

async fn downstream_tools(State(state): State<DownstreamState>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let tools: Vec<_> = state.tools.iter().map(|name| json!({"name": name})).collect();
    axum::Json(json!({ "tools": tools })).into_response()
}

/// A server running in the background until dropped.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    cancel: CancellationToken,
    handle: Option<JoinHandle<conduit_server::Result<()>>>,
}

impl TestServer {
    /// Start a gateway over `servers`.
    pub async fn gateway(servers: &[(&str, String)]) -> Result<Self> {
        let mut config = ConduitConfig::new();
        for (id, url) in servers {
            config.servers.push(DownstreamEntry::new(*id, url.clone()));
        }
        Self::gateway_with_config(&config).await
    }

    /// Start a gateway from a full configuration.
    pub async fn gateway_with_config(config: &ConduitConfig) -> Result<Self> {
        let server = GatewayServer::from_config(config)?;
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server.serve(listener, cancel.clone().cancelled_owned()));
        Self::ready(addr, cancel, handle, "/health").await
    }

    /// Start a bridge server over `process`.
    pub async fn bridge(process: ProcessConfig) -> Result<Self> {
        let bridge = Arc::new(Bridge::new(process));
        let server = BridgeServer::new(bridge, ServerConfig::default().with_request_logging(false));
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server.serve(listener, cancel.clone().cancelled_owned()));
        Self::ready(addr, cancel, handle, "/health").await
    }

    async fn ready(
        addr: SocketAddr,
        cancel: CancellationToken,
        handle: JoinHandle<conduit_server::Result<()>>,
        path: &str,
    ) -> Result<Self> {
        let client = Client::new();
        wait_for_server(&client, addr, path).await?;
        Ok(Self {
            addr,
            client,
            cancel,
            handle: Some(handle),
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{}", self.base_url(), path))
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(format!("{}{}", self.base_url(), path))
    }

    /// Trigger graceful shutdown and wait for the server to finish.
    pub async fn stop(mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            timeout(Duration::from_secs(10), handle).await???;
        }
        Ok(())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Wait for the server to accept connections.
async fn wait_for_server(client: &Client, addr: SocketAddr, path: &str) -> Result<()> {
    let url = format!("http://{}{}", addr, path);

    let result = timeout(Duration::from_secs(10), async {
        loop {
            match client.get(&url).send().await {
                Ok(_) => return,
                Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}

/// A stdio JSON-RPC server written in POSIX shell.
///
/// Answers `initialize`, `tools/list` and `tools/call` for the `greet` tool;
/// calling the `exit` tool terminates the process; anything else gets a
/// method-not-found error.
pub fn shell_mcp_server() -> ProcessConfig {
    let script = r#"
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"sh-mock","version":"1.0.0"}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"greet","description":"Say hello"}]}}\n' "$id" ;;
    *'"name":"greet"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"hello"}]}}\n' "$id" ;;
    *'"name":"exit"'*)
      exit 0 ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"method not found"}}\n' "$id" ;;
  esac
done
"#;
    ProcessConfig::new("sh")
        .with_arg("-c")
        .with_arg(script)
        .with_call_timeout(Duration::from_secs(5))
        .with_startup_timeout(Duration::from_secs(5))
}
