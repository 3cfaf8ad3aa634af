//! Common test utilities: mock downstream servers on ephemeral ports.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use conduit_config::{ConduitConfig, DownstreamEntry};
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;

/// How a mock downstream behaves.
#[derive(Debug, Clone)]
pub struct Behaviour {
    /// `/health` answers 200 when true, 500 otherwise.
    pub healthy: bool,
    /// Body of `/tools`; `None` makes discovery answer 500.
    pub tools: Option<Value>,
    /// Delay before answering `/tools` and `/slow`.
    pub delay: Duration,
    /// Delay before answering `/health`.
    pub health_delay: Duration,
}

impl Behaviour {
    pub fn healthy_with_tools(names: &[&str]) -> Self {
        let tools: Vec<Value> = names
            .iter()
            .map(|n| json!({"name": n, "description": format!("{n} tool")}))
            .collect();
        Self {
            healthy: true,
            tools: Some(json!({ "tools": tools })),
            delay: Duration::ZERO,
            health_delay: Duration::ZERO,
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::healthy_with_tools(&["hidden"])
        }
    }
}

struct MockState {
    behaviour: Behaviour,
    hits: AtomicUsize,
    health_checks: AtomicUsize,
}

/// A downstream server running in the background.
pub struct MockDownstream {
    pub addr: SocketAddr,
    state: Arc<MockState>,
    _handle: JoinHandle<()>,
}

impl MockDownstream {
    pub async fn start(behaviour: Behaviour) -> Result<Self> {
        let state = Arc::new(MockState {
            behaviour,
            hits: AtomicUsize::new(0),
            health_checks: AtomicUsize::new(0),
        });
        let app = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received on anything but `/health`.
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Requests received on `/health`.
    pub fn health_checks(&self) -> usize {
        self.state.health_checks.load(Ordering::SeqCst)
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    if path == "/health" {
        state.health_checks.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(state.behaviour.health_delay).await;
        return if state.behaviour.healthy {
            axum::Json(json!({"status": "ok"})).into_response()
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, "down").into_response()
        };
    }

    state.hits.fetch_add(1, Ordering::SeqCst);
    match path.as_str() {
        "/tools" => {
            tokio::time::sleep(state.behaviour.delay).await;
            match state.behaviour.tools {
                Some(ref tools) => axum::Json(tools.clone()).into_response(),
                None => (StatusCode::INTERNAL_SERVER_ERROR, "discovery broken").into_response(),
            }
        }
        "/slow" => {
            tokio::time::sleep(state.behaviour.delay).await;
            axum::Json(json!({"slow": true})).into_response()
        }
        "/error" => (
            StatusCode::IM_A_TEAPOT,
            [(header::CONTENT_TYPE, "text/plain")],
            "teapot",
        )
            .into_response(),
        _ => {
            let header_map: Map<String, Value> = headers
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str().to_string(),
                        Value::String(v.to_str().unwrap_or("").to_string()),
                    )
                })
                .collect();
            axum::Json(json!({
                "method": method.as_str(),
                "path": path,
                "query": uri.query(),
                "headers": header_map,
                "body": String::from_utf8_lossy(&body),
            }))
            .into_response()
        }
    }
}

/// An address nothing is listening on.
pub async fn closed_port_url() -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{}", addr))
}

/// Config registering each `(id, url)`.
pub fn config_for(servers: &[(&str, String)]) -> ConduitConfig {
    let mut config = ConduitConfig::new();
    for (id, url) in servers {
        config.servers.push(DownstreamEntry::new(*id, url.clone()));
    }
    config
}
