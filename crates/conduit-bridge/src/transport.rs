//! Async stdio transport for NDJSON JSON-RPC.
//!
//! Writes go through a single async mutex around the child's stdin so that
//! each acquisition writes exactly one complete line. A single reader task
//! owns stdout, reassembles lines and hands responses to [`PendingCalls`].

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bridge::ProcessConfig;
use crate::codec::{LineBuffer, encode_line, preview};
use crate::error::{BridgeError, Result};
use crate::pending::PendingCalls;
use crate::protocol::{self, JsonRpcNotification, JsonRpcRequest};

/// Size of each read from the subprocess's stdout.
const READ_CHUNK: usize = 8 * 1024;

/// How long to wait for the child to exit after killing it.
const KILL_WAIT: Duration = Duration::from_secs(5);

/// A running subprocess and the machinery to talk to it.
pub struct StdioTransport {
    stdin: Arc<Mutex<ChildStdin>>,
    child: Mutex<Child>,
    pid: Option<u32>,
    pending: Arc<PendingCalls>,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
    default_timeout: Duration,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("pid", &self.pid)
            .field("alive", &self.is_alive())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl StdioTransport {
    /// Spawn the configured command and start the reader task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: &ProcessConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(ref dir) = config.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            BridgeError::spawn_failed(format!("failed to spawn '{}': {}", config.command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::spawn_failed("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::spawn_failed("failed to capture stdout"))?;
        let pid = child.id();

        let pending = PendingCalls::new();
        let alive = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let reader = tokio::spawn(read_loop(
            stdout,
            LineBuffer::new(config.max_line_bytes),
            Arc::clone(&pending),
            Arc::clone(&alive),
            cancel.clone(),
        ));

        tracing::debug!(command = %config.command, pid = ?pid, "subprocess spawned");

        Ok(Self {
            stdin: Arc::new(Mutex::new(stdin)),
            child: Mutex::new(child),
            pid,
            pending,
            next_id: AtomicU64::new(1),
            alive,
            cancel,
            reader: parking_lot::Mutex::new(Some(reader)),
            default_timeout: config.call_timeout,
        })
    }

    /// Send a request and return its `result`, or the JSON-RPC error as
    /// [`BridgeError::Rpc`].
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let id = self.next_id();
        let message = JsonRpcRequest::new(id, method, params);
        let response = self.send_and_wait(id, method, &message, timeout).await?;
        protocol::into_result(response).map_err(|e| BridgeError::rpc(e.code, e.message, e.data))
    }

    /// Send a caller-built request object under a fresh id and return the
    /// whole response object, error responses included.
    ///
    /// Any `id` already present in `message` is overwritten.
    pub async fn request_raw(
        &self,
        mut message: Map<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let method = message
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let id = self.next_id();
        message.insert("id".to_string(), Value::from(id));
        self.send_and_wait(id, &method, &Value::Object(message), timeout)
            .await
    }

    /// Send a notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.send(&JsonRpcNotification::new(method, params)).await
    }

    /// Write one message without waiting for anything back.
    ///
    /// The write is bounded by the default call timeout.
    pub async fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        self.ensure_alive()?;
        let line = encode_line(message)?;
        let deadline = tokio::time::Instant::now() + self.default_timeout;
        match tokio::time::timeout_at(deadline, self.write_line(line)).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!(
                    "subprocess did not accept input within {}ms",
                    self.default_timeout.as_millis()
                ),
            ))),
        }
    }

    /// Whether the subprocess's stdout is still open.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// OS process id, if known.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Number of calls awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The pending-call table.
    pub fn pending(&self) -> &Arc<PendingCalls> {
        &self.pending
    }

    /// Timeout applied when a call does not specify one.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Kill the subprocess and reject every pending call.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        {
            let mut child = self.child.lock().await;
            if let Err(e) = child.start_kill() {
                tracing::trace!(error = %e, "kill failed; subprocess already exited");
            }
            match tokio::time::timeout(KILL_WAIT, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(pid = ?self.pid, %status, "subprocess exited"),
                Ok(Err(e)) => tracing::warn!(pid = ?self.pid, error = %e, "failed to reap subprocess"),
                Err(_) => tracing::warn!(pid = ?self.pid, "subprocess did not exit after kill"),
            }
        }

        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            let _ = reader.await;
        }

        self.alive.store(false, Ordering::SeqCst);
        self.pending.fail_all(|| BridgeError::ProcessTerminated);
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(BridgeError::ProcessTerminated)
        }
    }

    async fn send_and_wait<T: Serialize + ?Sized>(
        &self,
        id: u64,
        method: &str,
        message: &T,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        self.ensure_alive()?;
        let timeout = timeout.unwrap_or(self.default_timeout);
        let line = encode_line(message)?;

        // Registered before the write so a fast response cannot be missed.
        let (guard, rx) = self.pending.register(id, method);
        // The reader may have exited between the check above and registration.
        self.ensure_alive()?;

        // One deadline covers both the write and the wait for the response.
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + timeout;

        let reply = match tokio::time::timeout_at(deadline, self.write_line(line)).await {
            Ok(Ok(())) => {
                tracing::trace!(id, method, "request written");
                match tokio::time::timeout_at(deadline, rx).await {
                    Ok(Ok(reply)) => reply,
                    Ok(Err(_)) => Err(BridgeError::ProcessTerminated),
                    Err(_) => Err(timed_out(id, method, timeout, "response")),
                }
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(timed_out(id, method, timeout, "write")),
        };
        drop(guard);

        tracing::debug!(
            id,
            method,
            duration_ms = started.elapsed().as_millis() as u64,
            ok = reply.is_ok(),
            "call finished"
        );
        reply
    }

    /// Write one complete line to stdin.
    ///
    /// The write runs in its own task so that a caller giving up never leaves
    /// half a line in the pipe; the line still goes out whole once the
    /// subprocess drains its input, or fails when the subprocess is killed.
    async fn write_line(&self, line: Vec<u8>) -> Result<()> {
        let stdin = Arc::clone(&self.stdin);
        let write = tokio::spawn(async move {
            let mut stdin = stdin.lock().await;
            stdin.write_all(&line).await.map_err(write_error)?;
            stdin.flush().await.map_err(write_error)
        });
        write
            .await
            .map_err(|e| BridgeError::Io(std::io::Error::other(e)))?
    }
}

fn timed_out(id: u64, method: &str, after: Duration, stage: &str) -> BridgeError {
    tracing::debug!(
        id,
        method,
        stage,
        timeout_ms = after.as_millis() as u64,
        "call timed out"
    );
    BridgeError::Timeout { id, after }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        // The child itself is killed by kill_on_drop.
        self.cancel.cancel();
    }
}

fn write_error(e: std::io::Error) -> BridgeError {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset => {
            BridgeError::ProcessTerminated
        }
        _ => BridgeError::Io(e),
    }
}

async fn read_loop(
    mut stdout: ChildStdout,
    mut lines: LineBuffer,
    pending: Arc<PendingCalls>,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = stdout.read(&mut chunk) => read,
        };

        match read {
            Ok(0) => {
                tracing::debug!("subprocess stdout closed");
                if let Some(tail) = lines.finish() {
                    dispatch(&pending, &tail);
                }
                break;
            }
            Ok(n) => {
                let discarded = lines.discarded();
                for line in lines.push(&chunk[..n]) {
                    dispatch(&pending, &line);
                }
                if lines.discarded() > discarded {
                    tracing::warn!(
                        total_discarded = lines.discarded(),
                        "discarded overlong line from subprocess"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read subprocess stdout");
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    let rejected = pending.fail_all(|| BridgeError::ProcessTerminated);
    if rejected > 0 {
        tracing::warn!(rejected, "subprocess terminated with calls outstanding");
    }
}

/// Route one line from the subprocess.
fn dispatch(pending: &PendingCalls, line: &[u8]) {
    let value: Value = match serde_json::from_slice(line) {
        Ok(value) => value,
        Err(e) => {
            let err = BridgeError::protocol(e.to_string());
            tracing::debug!(error = %err, line = %preview(line), "dropping unparseable line");
            return;
        }
    };

    match protocol::response_id(&value) {
        Some(id) => {
            if !pending.complete(id, value) {
                tracing::trace!(id, "no caller waiting for response; dropped");
            }
        }
        None => {
            let method = value
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or("<none>");
            tracing::debug!(method, "ignoring message without a response id");
        }
    }
}
