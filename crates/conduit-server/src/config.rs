//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr};

use conduit_config::{BridgeConfig, GatewayConfig, defaults};

use crate::error::{Result, ServerError};

/// HTTP server configuration shared by the gateway and bridge surfaces.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// Log every request with its status and duration.
    pub request_logging: bool,

    /// Allow cross-origin requests from any origin.
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, defaults::GATEWAY_PORT)),
            request_logging: true,
            enable_cors: false,
        }
    }
}

impl ServerConfig {
    /// Create a config bound to `bind_address`.
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Server settings from the `[gateway]` section.
    pub fn from_gateway(config: &GatewayConfig) -> Result<Self> {
        let bind_address = config
            .bind_address()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        Ok(Self::new(bind_address).with_request_logging(config.request_logging))
    }

    /// Server settings from the `[bridge]` section.
    pub fn from_bridge(config: &BridgeConfig) -> Result<Self> {
        let bind_address = config
            .bind_address()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        Ok(Self::new(bind_address).with_request_logging(config.request_logging))
    }

    /// Set the bind address.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Enable or disable request logging.
    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }

    /// Enable or disable permissive CORS.
    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.enable_cors = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address.port(), 8000);
        assert!(config.bind_address.ip().is_loopback());
        assert!(config.request_logging);
        assert!(!config.enable_cors);
    }

    #[test]
    fn test_from_sections() {
        let gateway = GatewayConfig {
            port: 9100,
            request_logging: false,
            ..GatewayConfig::default()
        };
        let config = ServerConfig::from_gateway(&gateway).unwrap();
        assert_eq!(config.bind_address.port(), 9100);
        assert!(!config.request_logging);

        let bridge = BridgeConfig::new("cat");
        let config = ServerConfig::from_bridge(&bridge).unwrap();
        assert_eq!(config.bind_address.port(), 8100);
    }

    #[test]
    fn test_from_gateway_rejects_bad_bind() {
        let gateway = GatewayConfig {
            bind: "not an address".to_string(),
            ..GatewayConfig::default()
        };
        assert!(matches!(
            ServerConfig::from_gateway(&gateway),
            Err(ServerError::Config(_))
        ));
    }
}
