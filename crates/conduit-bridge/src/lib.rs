//! Process-transport bridge for Conduit.
//!
//! Spawns a subprocess that speaks newline-delimited JSON-RPC 2.0 on its
//! standard streams and exposes it as an async request/response API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Bridge                                                     │
//! │  - start / restart / shutdown / status                      │
//! │  - initialize handshake, tools/list, tools/call, raw calls  │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  StdioTransport                                             │
//! │  - one line per stdin lock hold                             │
//! │  - single reader task + LineBuffer on stdout                │
//! │  - PendingCalls keyed by request id                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use conduit_bridge::{Bridge, ProcessConfig};
//!
//! let bridge = Bridge::new(ProcessConfig::new("python").with_arg("-m").with_arg("server"));
//! bridge.start().await?;
//!
//! for tool in bridge.list_tools().await? {
//!     println!("{}", tool.name);
//! }
//!
//! let result = bridge.call_tool("echo", json!({"text": "hi"})).await?;
//! ```
//!
//! # Wire format
//!
//! One JSON object per line, UTF-8, terminated by `\n`:
//!
//! ```text
//! {"jsonrpc":"2.0","id":1,"method":"tools/list"}\n
//! ```
//!
//! Responses are matched to callers by `id` only, never by arrival order.

pub mod bridge;
pub mod codec;
pub mod error;
pub mod pending;
pub mod protocol;
pub mod transport;

pub use bridge::{Bridge, BridgeState, BridgeStatus, ProcessConfig};
pub use codec::{LineBuffer, encode_line};
pub use error::{BridgeError, Result};
pub use pending::{PendingCalls, PendingGuard};
pub use protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, ListToolsResult, ServerInfo, ToolContent, ToolInfo,
};
pub use transport::StdioTransport;
