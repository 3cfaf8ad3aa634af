//! Bridge lifecycle: spawn, handshake, calls, restart and shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::{BridgeError, Result};
use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JSONRPC_VERSION, ListToolsResult,
    ServerInfo, ToolInfo, methods,
};
use crate::transport::StdioTransport;

/// Upper bound on `tools/list` pages followed before giving up.
const MAX_TOOL_PAGES: usize = 64;

/// How to launch and talk to the subprocess.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Command to spawn.
    pub command: String,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Environment variables to set.
    pub env: Vec<(String, String)>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Default per-call timeout.
    pub call_timeout: Duration,
    /// Deadline for the initialize handshake.
    pub startup_timeout: Duration,
    /// Maximum accepted line length from the subprocess.
    pub max_line_bytes: usize,
}

impl ProcessConfig {
    /// Create a config for `command` with default timeouts.
    pub fn new(command: impl Into<String>) -> Self {
        use conduit_config::defaults;
        Self {
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            call_timeout: Duration::from_secs(defaults::CALL_TIMEOUT_SECS),
            startup_timeout: Duration::from_secs(defaults::STARTUP_TIMEOUT_SECS),
            max_line_bytes: defaults::MAX_LINE_BYTES,
        }
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Replace the arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set the default per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the handshake deadline.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Set the maximum accepted line length.
    pub fn with_max_line_bytes(mut self, max: usize) -> Self {
        self.max_line_bytes = max;
        self
    }
}

impl From<&conduit_config::BridgeConfig> for ProcessConfig {
    fn from(config: &conduit_config::BridgeConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env_tuples(),
            cwd: config.cwd.clone(),
            call_timeout: config.call_timeout(),
            startup_timeout: config.startup_timeout(),
            max_line_bytes: config.max_line_bytes,
        }
    }
}

/// Running or stopped, as reported by [`Bridge::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    Running,
    Stopped,
}

/// Point-in-time view of the bridge.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    /// Whether a subprocess is running.
    pub status: BridgeState,
    /// Whether calls will be accepted.
    pub ready: bool,
    /// OS process id of the current subprocess.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Server info from the handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerInfo>,
    /// Protocol version agreed in the handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    /// Calls awaiting a response.
    pub pending_calls: usize,
    /// Explicit restarts performed.
    pub restarts: u64,
    /// Seconds since the current subprocess completed its handshake.
    pub uptime_seconds: u64,
}

/// One spawned subprocess that completed its handshake.
struct Session {
    transport: StdioTransport,
    init: InitializeResult,
    started_at: Instant,
}

/// An owned, explicitly started subprocess bridge.
///
/// Calls made before [`Bridge::start`] completes fail with
/// [`BridgeError::NotReady`]. After the subprocess dies, calls fail with
/// [`BridgeError::ProcessTerminated`] until [`Bridge::restart`].
pub struct Bridge {
    config: ProcessConfig,
    session: RwLock<Option<Arc<Session>>>,
    lifecycle: tokio::sync::Mutex<()>,
    restarts: AtomicU64,
}

impl Bridge {
    /// Create a bridge; nothing is spawned until [`Bridge::start`].
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            session: RwLock::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            restarts: AtomicU64::new(0),
        }
    }

    /// The process configuration.
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Spawn the subprocess and perform the initialize handshake.
    ///
    /// A no-op if a live subprocess is already running.
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.current().is_some_and(|s| s.transport.is_alive()) {
            return Ok(());
        }
        let session = self.launch().await?;
        *self.session.write() = Some(Arc::new(session));
        Ok(())
    }

    /// Whether the handshake completed and the subprocess is still running.
    pub fn is_ready(&self) -> bool {
        self.current().is_some_and(|s| s.transport.is_alive())
    }

    /// Shut down the current subprocess (if any) and start a fresh one.
    pub async fn restart(&self) -> Result<BridgeStatus> {
        {
            let _lifecycle = self.lifecycle.lock().await;
            let old = self.session.write().take();
            if let Some(old) = old {
                tracing::info!(pid = ?old.transport.pid(), "stopping subprocess for restart");
                old.transport.shutdown().await;
            }

            let session = self.launch().await?;
            *self.session.write() = Some(Arc::new(session));
            let restarts = self.restarts.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::info!(restarts, "bridge restarted");
        }
        Ok(self.status())
    }

    /// Kill the subprocess and reject outstanding calls.
    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let old = self.session.write().take();
        if let Some(old) = old {
            old.transport.shutdown().await;
            tracing::info!(pid = ?old.transport.pid(), "bridge shut down");
        }
    }

    /// Current status.
    pub fn status(&self) -> BridgeStatus {
        let restarts = self.restarts.load(Ordering::SeqCst);
        match self.current() {
            Some(session) => {
                let running = session.transport.is_alive();
                BridgeStatus {
                    status: if running {
                        BridgeState::Running
                    } else {
                        BridgeState::Stopped
                    },
                    ready: running,
                    pid: session.transport.pid(),
                    server: Some(session.init.server_info.clone()),
                    protocol_version: Some(session.init.protocol_version.clone()),
                    pending_calls: session.transport.pending_count(),
                    restarts,
                    uptime_seconds: session.started_at.elapsed().as_secs(),
                }
            }
            None => BridgeStatus {
                status: BridgeState::Stopped,
                ready: false,
                pid: None,
                server: None,
                protocol_version: None,
                pending_calls: 0,
                restarts,
                uptime_seconds: 0,
            },
        }
    }

    /// Server info from the handshake, if started.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.current().map(|s| s.init.server_info.clone())
    }

    /// Call `method` and return its result.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.request_with_timeout(method, params, None).await
    }

    /// Call `method` with an explicit deadline instead of the configured one.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let session = self.ready_session()?;
        session.transport.request(method, params, timeout).await
    }

    /// List every tool, following `nextCursor` pagination.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self.request(methods::TOOLS_LIST, params).await?;
            let page: ListToolsResult = serde_json::from_value(result).map_err(|e| {
                BridgeError::protocol(format!("invalid tools/list result: {}", e))
            })?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        tracing::warn!(pages = MAX_TOOL_PAGES, "tools/list pagination limit reached");
        Ok(tools)
    }

    /// Invoke a tool and return the raw `tools/call` result.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        })?;
        self.request(methods::TOOLS_CALL, Some(params)).await
    }

    /// Pass a caller-built JSON-RPC message through to the subprocess.
    ///
    /// A message with an `id` is sent under a fresh bridge-issued id; the
    /// response comes back with the caller's id restored. JSON-RPC error
    /// responses are returned as-is. A message without an `id` is sent as a
    /// notification and `Ok(None)` is returned.
    pub async fn forward_raw(&self, message: Value) -> Result<Option<Value>> {
        let Value::Object(mut obj) = message else {
            return Err(BridgeError::invalid_request("expected a JSON object"));
        };
        if !obj.get("method").is_some_and(Value::is_string) {
            return Err(BridgeError::invalid_request("missing string field 'method'"));
        }
        obj.entry("jsonrpc")
            .or_insert_with(|| Value::from(JSONRPC_VERSION));

        let session = self.ready_session()?;
        match obj.remove("id") {
            None => {
                session.transport.send(&obj).await?;
                Ok(None)
            }
            Some(original_id) => {
                let mut response = session.transport.request_raw(obj, None).await?;
                if let Some(response) = response.as_object_mut() {
                    response.insert("id".to_string(), original_id);
                }
                Ok(Some(response))
            }
        }
    }

    fn current(&self) -> Option<Arc<Session>> {
        self.session.read().clone()
    }

    fn ready_session(&self) -> Result<Arc<Session>> {
        let session = self.current().ok_or(BridgeError::NotReady)?;
        if !session.transport.is_alive() {
            return Err(BridgeError::ProcessTerminated);
        }
        Ok(session)
    }

    async fn launch(&self) -> Result<Session> {
        let transport = StdioTransport::spawn(&self.config)?;
        tracing::info!(
            command = %self.config.command,
            pid = ?transport.pid(),
            "subprocess started"
        );

        match handshake(&transport, self.config.startup_timeout).await {
            Ok(init) => {
                tracing::info!(
                    server = %init.server_info.name,
                    version = %init.server_info.version,
                    protocol = %init.protocol_version,
                    "bridge ready"
                );
                Ok(Session {
                    transport,
                    init,
                    started_at: Instant::now(),
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "handshake failed; killing subprocess");
                transport.shutdown().await;
                Err(BridgeError::startup_failed(e.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("command", &self.config.command)
            .field("ready", &self.is_ready())
            .finish()
    }
}

async fn handshake(transport: &StdioTransport, timeout: Duration) -> Result<InitializeResult> {
    let params = serde_json::to_value(InitializeParams::default())?;
    let result = transport
        .request(methods::INITIALIZE, Some(params), Some(timeout))
        .await?;
    let init: InitializeResult = serde_json::from_value(result)
        .map_err(|e| BridgeError::protocol(format!("invalid initialize result: {}", e)))?;
    transport.notify(methods::INITIALIZED, None).await?;
    Ok(init)
}
