//! Forwarding of routed requests to downstream servers.

use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{self, HeaderMap, HeaderName};
use reqwest::{Method, StatusCode};

use crate::error::{GatewayError, Result};
use crate::health::{HealthMonitor, HealthStatus};
use crate::registry::{DownstreamServer, Registry};
use crate::router::{RoutingDecision, RoutingError};

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Whether `name` is a hop-by-hop header.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Copy `headers` without hop-by-hop headers, `host` and `content-length`.
///
/// Headers named in a `Connection` header value are dropped too.
pub fn sanitize_headers(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut clean = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_stripped(name) || listed.iter().any(|l| l == name.as_str()) {
            continue;
        }
        clean.append(name.clone(), value.clone());
    }
    clean
}

fn is_stripped(name: &HeaderName) -> bool {
    *name == header::HOST || *name == header::CONTENT_LENGTH || is_hop_by_hop(name.as_str())
}

/// An inbound request to forward.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    /// HTTP method.
    pub method: Method,
    /// Inbound headers, unsanitized.
    pub headers: HeaderMap,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Request body.
    pub body: Vec<u8>,
}

impl ForwardRequest {
    /// A bodiless GET.
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            query: None,
            body: Vec::new(),
        }
    }
}

/// A downstream response, passed through whatever its status.
#[derive(Debug, Clone)]
pub struct DownstreamResponse {
    /// Status returned by the downstream server.
    pub status: StatusCode,
    /// Response headers, sanitized.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
}

impl DownstreamResponse {
    /// Parse the body as JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Forwards routed requests, applying the health gate and per-server timeouts.
#[derive(Debug)]
pub struct Forwarder {
    client: reqwest::Client,
    registry: Arc<Registry>,
    health: Arc<HealthMonitor>,
}

impl Forwarder {
    /// Create a forwarder.
    pub fn new(client: reqwest::Client, registry: Arc<Registry>, health: Arc<HealthMonitor>) -> Self {
        Self {
            client,
            registry,
            health,
        }
    }

    /// Forward `request` to the server named in `decision`.
    ///
    /// A server last seen `unhealthy` is refused without any network call.
    pub async fn forward(
        &self,
        decision: &RoutingDecision,
        request: ForwardRequest,
    ) -> Result<DownstreamResponse> {
        let server = self
            .registry
            .get(&decision.target)
            .ok_or_else(|| RoutingError::UnknownTarget {
                target: decision.target.clone(),
                valid_targets: self.registry.ids(),
            })?;

        if self.health.status(&server.id) == Some(HealthStatus::Unhealthy) {
            tracing::debug!(server = %server.id, "refusing to forward to unhealthy server");
            return Err(GatewayError::unavailable(
                &server.id,
                "marked unhealthy by health monitor",
            ));
        }

        let mut url = server.endpoint(&decision.path);
        if let Some(query) = request.query.as_deref().filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }

        let method = request.method.clone();
        let mut builder = self
            .client
            .request(method.clone(), &url)
            .headers(sanitize_headers(&request.headers))
            .timeout(server.timeout);
        if carries_body(&method) {
            builder = builder.body(request.body);
        }

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| classify(server, e))?;
        let status = response.status();
        let headers = sanitize_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(server, e))?
            .to_vec();
        let duration_ms = started.elapsed().as_millis() as u64;

        if status.is_client_error() || status.is_server_error() {
            tracing::warn!(
                server = %server.id,
                method = %method,
                path = %decision.path,
                status = status.as_u16(),
                duration_ms,
                "downstream returned an error; passing through"
            );
        } else {
            tracing::debug!(
                server = %server.id,
                method = %method,
                path = %decision.path,
                status = status.as_u16(),
                duration_ms,
                "forwarded"
            );
        }

        Ok(DownstreamResponse {
            status,
            headers,
            body,
        })
    }
}

fn carries_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn classify(server: &DownstreamServer, error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        tracing::warn!(
            server = %server.id,
            timeout_ms = server.timeout.as_millis() as u64,
            "downstream timed out"
        );
        GatewayError::Timeout {
            server: server.id.clone(),
            after: server.timeout,
        }
    } else if error.is_connect() {
        tracing::warn!(server = %server.id, url = %server.url, error = %error, "downstream connection failed");
        GatewayError::unavailable(&server.id, format!("connection failed: {}", error))
    } else {
        tracing::error!(server = %server.id, error = %error, "forwarding failed");
        GatewayError::internal(error.to_string())
    }
}
