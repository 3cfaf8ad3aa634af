//! HTTP surfaces for Conduit.
//!
//! Two independent servers share the same middleware and error mapping:
//!
//! - [`GatewayServer`] routes requests to downstream servers, reports their
//!   health and serves the aggregated tool catalog.
//! - [`BridgeServer`] exposes one stdio JSON-RPC subprocess over HTTP.
//!
//! # Example
//!
//! ```ignore
//! use conduit_server::GatewayServer;
//!
//! let config = conduit_config::load_config(None)?.config;
//! let server = GatewayServer::from_config(&config)?;
//! server.run().await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::{ErrorResponse, Result, ServerError};
pub use middleware::{RequestStats, request_logging_middleware};
pub use state::{BridgeAppState, GatewayState};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, middleware as axum_middleware};
use conduit_bridge::{Bridge, ProcessConfig};
use conduit_config::{BridgeConfig, ConduitConfig};
use conduit_gateway::Gateway;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// The gateway HTTP server.
pub struct GatewayServer {
    state: GatewayState,
}

impl GatewayServer {
    /// Create a server around an already-built gateway.
    pub fn new(gateway: Gateway, config: ServerConfig) -> Self {
        Self {
            state: GatewayState::new(gateway, config),
        }
    }

    /// Build the gateway and server settings from a full configuration.
    pub fn from_config(config: &ConduitConfig) -> Result<Self> {
        let gateway = Gateway::from_config(config)?;
        let server_config = ServerConfig::from_gateway(gateway.settings())?;
        Ok(Self::new(gateway, server_config))
    }

    /// The wired gateway.
    pub fn gateway(&self) -> &Gateway {
        &self.state.gateway
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let router = routes::gateway_routes(self.state.gateway.strategy())
            .layer(axum_middleware::from_fn_with_state(
                Arc::clone(&self.state.stats),
                request_logging_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone());
        with_cors(router, &self.state.config)
    }

    /// Run the server until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let addr = self.bind_address();
        self.run_on(addr).await
    }

    /// Run the server on a specific address until Ctrl-C.
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        let listener = bind(addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `shutdown` completes.
    ///
    /// Polls every downstream once before accepting traffic, then keeps one
    /// health poller per server running until shutdown.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let gateway = self.state.gateway.clone();
        let monitor = gateway.health().start(CancellationToken::new()).await;

        let addr = local_addr(&listener);
        info!(
            addr = %addr,
            strategy = %gateway.strategy(),
            servers = gateway.registry().len(),
            "Starting gateway server"
        );

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)));

        monitor.stop().await;
        info!("gateway server stopped");
        result
    }
}

/// The bridge HTTP server.
pub struct BridgeServer {
    state: BridgeAppState,
}

impl BridgeServer {
    /// Create a server around a bridge; the bridge is started by [`BridgeServer::serve`].
    pub fn new(bridge: Arc<Bridge>, config: ServerConfig) -> Self {
        Self {
            state: BridgeAppState::new(bridge, config),
        }
    }

    /// Build the bridge and server settings from the `[bridge]` section.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        let server_config = ServerConfig::from_bridge(config)?;
        let bridge = Arc::new(Bridge::new(ProcessConfig::from(config)));
        Ok(Self::new(bridge, server_config))
    }

    /// The bridged subprocess.
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.state.bridge
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let router = routes::bridge_routes()
            .layer(axum_middleware::from_fn_with_state(
                Arc::clone(&self.state.stats),
                request_logging_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone());
        with_cors(router, &self.state.config)
    }

    /// Run the server until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let addr = self.bind_address();
        self.run_on(addr).await
    }

    /// Run the server on a specific address until Ctrl-C.
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        let listener = bind(addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Start the subprocess, then serve on `listener` until `shutdown`
    /// completes. The subprocess is shut down afterwards.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let bridge = Arc::clone(&self.state.bridge);
        bridge.start().await?;

        info!(
            addr = %local_addr(&listener),
            command = %bridge.config().command,
            pid = ?bridge.status().pid,
            "Starting bridge server"
        );

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)));

        bridge.shutdown().await;
        info!("bridge server stopped");
        result
    }
}

fn with_cors(router: Router, config: &ServerConfig) -> Router {
    if !config.enable_cors {
        return router;
    }
    router.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Internal(format!("Failed to bind {}: {}", addr, e)))
}

fn local_addr(listener: &TcpListener) -> String {
    listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Completes on Ctrl-C.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
    }
}
