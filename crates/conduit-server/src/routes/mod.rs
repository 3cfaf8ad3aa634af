//! HTTP routes.

pub mod bridge;
pub mod gateway;

pub use bridge::{ToolsResponse, bridge_routes};
pub use gateway::{GatewayHealthResponse, InfoResponse, ServerSummary, gateway_routes};
