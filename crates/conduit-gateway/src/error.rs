//! Error types for gateway operations.

use std::time::Duration;

use thiserror::Error;

use crate::router::RoutingError;

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Error type for gateway operations.
///
/// A downstream server's own error response (4xx/5xx) is not an error here:
/// the forwarder returns it unchanged as a [`crate::DownstreamResponse`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration could not be turned into a gateway.
    #[error(transparent)]
    Config(#[from] conduit_config::ConfigError),

    /// The request could not be routed to a registered server.
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// The target is health-gated or refused the connection.
    #[error("downstream '{server}' unavailable: {reason}")]
    ServerUnavailable {
        /// Target server id.
        server: String,
        /// Why it is unavailable.
        reason: String,
    },

    /// The target did not answer within its per-call timeout.
    #[error("downstream '{server}' timed out after {}s", after.as_secs_f64())]
    Timeout {
        /// Target server id.
        server: String,
        /// Timeout that elapsed.
        after: Duration,
    },

    /// Unexpected failure; details are logged, not returned to callers.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Create a server unavailable error.
    pub fn unavailable(server: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ServerUnavailable {
            server: server.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Routing(e) => e.code(),
            Self::ServerUnavailable { .. } => "server_unavailable",
            Self::Timeout { .. } => "timeout",
            Self::Internal(_) => "internal_error",
        }
    }
}
