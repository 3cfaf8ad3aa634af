//! Error types for the server.
//!
//! Every failure reaches the client as a JSON object with an `error` message
//! and a machine-readable `code`, plus whatever context lets the caller fix
//! the request (the registered targets, the JSON-RPC error payload).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use conduit_bridge::BridgeError;
use conduit_gateway::GatewayError;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Routing, health-gate or forwarding failure.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Subprocess bridge failure.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// No route matched the request.
    #[error("no route for '{path}'")]
    NotFound {
        /// Requested path.
        path: String,
        /// Registered targets, when serving a gateway.
        valid_targets: Vec<String>,
    },

    /// Bad request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Configuration could not be turned into a server.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Default, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Error code for programmatic handling.
    pub code: String,
    /// Registered server ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_targets: Option<Vec<String>>,
    /// Requested path, for unmatched routes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Downstream server involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Why the downstream is unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Numeric JSON-RPC error code from the subprocess.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_code: Option<i64>,
    /// JSON-RPC error data from the subprocess.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            ..Default::default()
        }
    }
}

impl ServerError {
    /// HTTP status and response body for this error.
    pub fn to_parts(&self) -> (StatusCode, ErrorResponse) {
        match self {
            ServerError::Gateway(e) => gateway_parts(e),
            ServerError::Bridge(e) => bridge_parts(e),
            ServerError::NotFound {
                path,
                valid_targets,
            } => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    path: Some(path.clone()),
                    valid_targets: Some(valid_targets.clone()),
                    ..ErrorResponse::new("not found", "not_found")
                },
            ),
            ServerError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(msg.clone(), "bad_request"),
            ),
            ServerError::Config(_) | ServerError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("internal server error", "internal_error"),
            ),
        }
    }
}

fn gateway_parts(error: &GatewayError) -> (StatusCode, ErrorResponse) {
    match error {
        GatewayError::Routing(e) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse {
                valid_targets: e.valid_targets().map(<[String]>::to_vec),
                ..ErrorResponse::new(e.to_string(), e.code())
            },
        ),
        GatewayError::ServerUnavailable { server, reason } => (
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorResponse {
                server: Some(server.clone()),
                detail: Some(reason.clone()),
                ..ErrorResponse::new("downstream unavailable", error.code())
            },
        ),
        GatewayError::Timeout { server, .. } => (
            StatusCode::GATEWAY_TIMEOUT,
            ErrorResponse {
                server: Some(server.clone()),
                ..ErrorResponse::new(error.to_string(), error.code())
            },
        ),
        GatewayError::Config(_) | GatewayError::Internal(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new("internal proxy error", "internal_error"),
        ),
    }
}

fn bridge_parts(error: &BridgeError) -> (StatusCode, ErrorResponse) {
    match error {
        BridgeError::Rpc {
            code,
            message,
            data,
        } => (
            StatusCode::BAD_GATEWAY,
            ErrorResponse {
                rpc_code: Some(*code),
                data: data.clone(),
                ..ErrorResponse::new(message.clone(), error.code())
            },
        ),
        BridgeError::Timeout { .. } => (
            StatusCode::GATEWAY_TIMEOUT,
            ErrorResponse::new(error.to_string(), error.code()),
        ),
        BridgeError::InvalidRequest(msg) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::new(msg.clone(), error.code()),
        ),
        BridgeError::Protocol(_) => (
            StatusCode::BAD_GATEWAY,
            ErrorResponse::new("invalid response from subprocess", error.code()),
        ),
        e if e.is_unavailable() => (
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorResponse::new(e.to_string(), e.code()),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new("internal bridge error", "internal_error"),
        ),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = self.to_parts();

        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(status = %status.as_u16(), code = %body.code, error = %self, "Server error");
        } else {
            tracing::warn!(status = %status.as_u16(), code = %body.code, error = %self, "Client error");
        }

        (status, Json(body)).into_response()
    }
}
