//! Error types for bridge operations.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Error type for bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Failed to spawn the subprocess.
    #[error("failed to spawn subprocess: {0}")]
    SpawnFailed(String),

    /// The initialize handshake failed or timed out.
    #[error("startup failed: {0}")]
    StartupFailed(String),

    /// The bridge has not been started, or a (re)start is in progress.
    #[error("bridge not ready - start() has not completed")]
    NotReady,

    /// The subprocess exited or its stdout closed.
    #[error("subprocess terminated")]
    ProcessTerminated,

    /// No response arrived before the call's deadline.
    #[error("request {id} timed out after {}ms", after.as_millis())]
    Timeout {
        /// Request id on the wire.
        id: u64,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// The subprocess answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// Error code from the subprocess.
        code: i64,
        /// Error message from the subprocess.
        message: String,
        /// Optional additional data.
        data: Option<Value>,
    },

    /// A message from the subprocess could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A caller-supplied message is not a usable JSON-RPC object.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a spawn failed error.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create a startup failed error.
    pub fn startup_failed(msg: impl Into<String>) -> Self {
        Self::StartupFailed(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an rpc error from a JSON-RPC error object.
    pub fn rpc(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
            data,
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SpawnFailed(_) => "spawn_failed",
            Self::StartupFailed(_) => "startup_failed",
            Self::NotReady => "not_ready",
            Self::ProcessTerminated => "process_terminated",
            Self::Timeout { .. } => "timeout",
            Self::Rpc { .. } => "rpc_error",
            Self::Protocol(_) => "protocol_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Json(_) => "json_error",
            Self::Io(_) => "io_error",
        }
    }

    /// Whether the error means the subprocess is gone or not yet usable.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::NotReady | Self::ProcessTerminated | Self::SpawnFailed(_) | Self::StartupFailed(_)
        )
    }
}
