//! Application state shared across handlers.

use std::sync::Arc;

use conduit_bridge::Bridge;
use conduit_gateway::Gateway;

use crate::config::ServerConfig;
use crate::middleware::RequestStats;

/// State of the gateway HTTP surface.
#[derive(Clone)]
pub struct GatewayState {
    /// Wired gateway components.
    pub gateway: Gateway,

    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Request counter and uptime.
    pub stats: Arc<RequestStats>,
}

impl GatewayState {
    /// Create a new gateway state.
    pub fn new(gateway: Gateway, config: ServerConfig) -> Self {
        Self {
            stats: Arc::new(RequestStats::new(config.request_logging)),
            gateway,
            config: Arc::new(config),
        }
    }
}

/// State of the bridge HTTP surface.
#[derive(Clone)]
pub struct BridgeAppState {
    /// The bridged subprocess.
    pub bridge: Arc<Bridge>,

    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Request counter and uptime.
    pub stats: Arc<RequestStats>,
}

impl BridgeAppState {
    /// Create a new bridge state.
    pub fn new(bridge: Arc<Bridge>, config: ServerConfig) -> Self {
        Self {
            stats: Arc::new(RequestStats::new(config.request_logging)),
            bridge,
            config: Arc::new(config),
        }
    }
}
