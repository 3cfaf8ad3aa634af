//! Bridge endpoints over one stdio subprocess.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use conduit_bridge::{BridgeStatus, ToolInfo};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, ServerError};
use crate::state::BridgeAppState;

/// Tool discovery response.
#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolInfo>,
}

/// GET /health
///
/// 200 when the subprocess is ready, 503 otherwise; the body is the same.
pub async fn health(State(state): State<BridgeAppState>) -> (StatusCode, Json<BridgeStatus>) {
    let status = state.bridge.status();
    let code = if status.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

/// GET /tools
pub async fn tools(State(state): State<BridgeAppState>) -> Result<Json<ToolsResponse>> {
    let tools = state.bridge.list_tools().await?;
    Ok(Json(ToolsResponse { tools }))
}

/// POST /mcp
///
/// Raw JSON-RPC passthrough. Requests get the subprocess's response with the
/// caller's id restored; notifications get 202 Accepted.
pub async fn mcp(State(state): State<BridgeAppState>, body: Bytes) -> Result<Response> {
    let message: Value = serde_json::from_slice(&body)
        .map_err(|e| ServerError::BadRequest(format!("invalid JSON: {}", e)))?;

    match state.bridge.forward_raw(message).await? {
        Some(response) => Ok(Json(response).into_response()),
        None => Ok(StatusCode::ACCEPTED.into_response()),
    }
}

/// POST /invoke/{name}
///
/// The body is the tool's arguments object; an empty body means `{}`.
pub async fn invoke(
    State(state): State<BridgeAppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>> {
    let arguments = parse_arguments(&body)?;
    let result = state.bridge.call_tool(&name, arguments).await?;
    Ok(Json(result))
}

/// POST /restart
pub async fn restart(State(state): State<BridgeAppState>) -> Result<Json<BridgeStatus>> {
    tracing::info!("restart requested over HTTP");
    let status = state.bridge.restart().await?;
    Ok(Json(status))
}

fn parse_arguments(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    match serde_json::from_slice(body) {
        Ok(Value::Object(args)) => Ok(Value::Object(args)),
        Ok(_) => Err(ServerError::BadRequest(
            "tool arguments must be a JSON object".to_string(),
        )),
        Err(e) => Err(ServerError::BadRequest(format!("invalid JSON: {}", e))),
    }
}

/// Bridge routes.
pub fn bridge_routes() -> Router<BridgeAppState> {
    Router::new()
        .route("/health", get(health))
        .route("/tools", get(tools))
        .route("/mcp", post(mcp))
        .route("/invoke/{name}", post(invoke))
        .route("/restart", post(restart))
}
