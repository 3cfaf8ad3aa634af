//! Gateway endpoints: health, info, aggregated catalog and the proxy route.

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, Uri},
    response::Response,
    routing::{any, get},
};
use conduit_config::RoutingStrategy;
use conduit_gateway::{AggregatedCatalog, ForwardRequest, HealthRecord, TARGET_HEADER};
use serde::Serialize;

use crate::error::{Result, ServerError};
use crate::state::GatewayState;

/// Gateway health response.
#[derive(Debug, Serialize)]
pub struct GatewayHealthResponse {
    /// `ok` when no server is unhealthy, `degraded` otherwise.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Seconds since the server started.
    pub uptime_seconds: u64,
    /// Requests received so far.
    pub requests: u64,
    /// Last health record per downstream server.
    pub servers: BTreeMap<String, HealthRecord>,
}

/// One downstream server as listed by `/info`.
#[derive(Debug, Serialize)]
pub struct ServerSummary {
    pub id: String,
    pub url: String,
    pub description: String,
    pub timeout_secs: u64,
}

/// Gateway configuration summary.
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
    pub routing_strategy: RoutingStrategy,
    /// Path the proxy route is mounted under.
    pub base_path: String,
    /// Header naming the target, under the header strategy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_target: Option<String>,
    pub health_interval_secs: u64,
    pub servers: Vec<ServerSummary>,
}

/// GET /health
pub async fn health(State(state): State<GatewayState>) -> Json<GatewayHealthResponse> {
    let health = state.gateway.health();
    let status = if health.unhealthy_count() == 0 {
        "ok"
    } else {
        "degraded"
    };
    let servers = health
        .snapshot()
        .into_iter()
        .map(|record| (record.server.clone(), record))
        .collect();

    Json(GatewayHealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.stats.uptime_seconds(),
        requests: state.stats.requests(),
        servers,
    })
}

/// GET /info
pub async fn info(State(state): State<GatewayState>) -> Json<InfoResponse> {
    let gateway = &state.gateway;
    let router = gateway.router();
    let servers = gateway
        .registry()
        .iter()
        .map(|server| ServerSummary {
            id: server.id.clone(),
            url: server.url.clone(),
            description: server.description.clone(),
            timeout_secs: server.timeout.as_secs(),
        })
        .collect();

    Json(InfoResponse {
        name: "conduit-gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        routing_strategy: router.strategy(),
        base_path: router.base_path().to_string(),
        routing_header: (router.strategy() == RoutingStrategy::Header)
            .then(|| TARGET_HEADER.to_string()),
        default_target: router.default_target().map(str::to_string),
        health_interval_secs: gateway.health().interval().as_secs(),
        servers,
    })
}

/// GET /mcp/get_methods
///
/// Always 200; unreachable servers are reported inside the catalog.
pub async fn get_methods(State(state): State<GatewayState>) -> Json<AggregatedCatalog> {
    Json(state.gateway.aggregator().collect().await)
}

/// Proxy route of the active strategy.
///
/// Downstream error responses come back unchanged; only routing, health-gate
/// and transport failures become gateway errors.
pub async fn proxy(
    State(state): State<GatewayState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let request = ForwardRequest {
        method,
        headers,
        query: uri.query().map(str::to_string),
        body: body.to_vec(),
    };
    let downstream = state.gateway.route_and_forward(uri.path(), request).await?;

    let mut response = Response::new(Body::from(downstream.body));
    *response.status_mut() = downstream.status;
    *response.headers_mut() = downstream.headers;
    Ok(response)
}

/// Unmatched routes.
pub async fn not_found(State(state): State<GatewayState>, uri: Uri) -> ServerError {
    ServerError::NotFound {
        path: uri.path().to_string(),
        valid_targets: state.gateway.registry().ids(),
    }
}

/// Gateway routes; only the active strategy's proxy route is mounted.
pub fn gateway_routes(strategy: RoutingStrategy) -> Router<GatewayState> {
    let router = Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        // Other methods on the catalog path fall through to the 404 body.
        .route("/mcp/get_methods", get(get_methods).fallback(not_found));

    let router = match strategy {
        RoutingStrategy::Prefix => router.route("/proxy/{*rest}", any(proxy)),
        RoutingStrategy::Header => router
            .route("/mcp", any(proxy))
            .route("/mcp/{*rest}", any(proxy)),
    };

    router.fallback(not_found)
}
