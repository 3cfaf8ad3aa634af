//! Routing gateway core for Conduit.
//!
//! Routes tool-invocation requests to one of several downstream HTTP servers,
//! refuses to forward to servers the health monitor believes are down, and
//! merges every server's tool catalog into one namespaced list.
//!
//! ```text
//! request ──► RequestRouter ──► health gate ──► Forwarder ──► downstream
//!                  │                 ▲
//!                  ▼                 │
//!              Registry ◄──── HealthMonitor (one poller per server)
//!                  │
//!                  ▼
//!             Aggregator (concurrent discovery fan-out)
//! ```
//!
//! This crate knows nothing about the HTTP framework serving it; it speaks
//! `reqwest`/`http` types and leaves response rendering to the caller.

pub mod aggregate;
pub mod error;
pub mod forward;
pub mod health;
pub mod registry;
pub mod router;

use std::sync::Arc;
use std::time::Duration;

use conduit_config::{ConduitConfig, GatewayConfig, RoutingStrategy};

pub use aggregate::{AggregatedCatalog, Aggregator, Availability, ServerCatalog};
pub use error::{GatewayError, Result};
pub use forward::{DownstreamResponse, ForwardRequest, Forwarder, is_hop_by_hop, sanitize_headers};
pub use health::{HealthMonitor, HealthRecord, HealthStatus, MonitorHandle, ProbeOutcome};
pub use registry::{DownstreamServer, Registry};
pub use router::{
    HEADER_BASE, PREFIX_BASE, RequestRouter, RoutingDecision, RoutingError, TARGET_HEADER,
};

/// All gateway components wired together from one configuration.
#[derive(Debug, Clone)]
pub struct Gateway {
    settings: GatewayConfig,
    registry: Arc<Registry>,
    health: Arc<HealthMonitor>,
    router: Arc<RequestRouter>,
    forwarder: Arc<Forwarder>,
    aggregator: Arc<Aggregator>,
}

impl Gateway {
    /// Build the gateway from a validated configuration.
    pub fn from_config(config: &ConduitConfig) -> Result<Self> {
        config.validate()?;
        let settings = config.gateway_or_default();
        let registry = Arc::new(Registry::from_config(config)?);
        let client = http_client()?;

        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&registry),
            client.clone(),
            settings.health_interval(),
            settings.health_timeout(),
        ));
        let router = Arc::new(RequestRouter::new(
            settings.routing_strategy,
            Arc::clone(&registry),
            settings.default_target.clone(),
        ));
        let forwarder = Arc::new(Forwarder::new(
            client.clone(),
            Arc::clone(&registry),
            Arc::clone(&health),
        ));
        let aggregator = Arc::new(Aggregator::new(
            client,
            Arc::clone(&registry),
            Arc::clone(&health),
        ));

        tracing::info!(
            servers = registry.len(),
            strategy = %settings.routing_strategy,
            "gateway configured"
        );

        Ok(Self {
            settings,
            registry,
            health,
            router,
            forwarder,
            aggregator,
        })
    }

    /// Resolve the target and forward the request.
    pub async fn route_and_forward(
        &self,
        path: &str,
        request: ForwardRequest,
    ) -> Result<DownstreamResponse> {
        let decision = self.router.resolve(path, &request.headers)?;
        self.forwarder.forward(&decision, request).await
    }

    /// Gateway section of the configuration.
    pub fn settings(&self) -> &GatewayConfig {
        &self.settings
    }

    /// Active routing strategy.
    pub fn strategy(&self) -> RoutingStrategy {
        self.router.strategy()
    }

    /// Downstream registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Health monitor.
    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Target resolver.
    pub fn router(&self) -> &Arc<RequestRouter> {
        &self.router
    }

    /// Forwarder.
    pub fn forwarder(&self) -> &Arc<Forwarder> {
        &self.forwarder
    }

    /// Catalog aggregator.
    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }
}

/// Shared HTTP client for forwarding, probing and discovery.
///
/// No client-wide timeout: every request sets its own.
fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("conduit/", env!("CARGO_PKG_VERSION")))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(|e| GatewayError::internal(format!("failed to build HTTP client: {}", e)))
}
