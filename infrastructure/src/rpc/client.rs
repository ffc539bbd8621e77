//! Process-backed JSON-RPC client for one worker.
//!
//! [`RpcClient`] owns at most one live worker process. A background reader
//! task is the single owner of the worker's stdout: it reassembles lines
//! with a [`LineBuffer`], classifies each frame and resolves the matching
//! entry of the pending table. Many requests may be outstanding at once;
//! each one waits on its own `oneshot` with its own deadline.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected --connect()--> Connecting --initialize()--> Ready
//!      ^                                                     |
//!      +------ teardown (disconnect, worker exit, EOF) ------+
//! ```
//!
//! Teardown rejects every pending request with [`RpcError::Disconnected`],
//! kills the process and stops the background tasks. It is idempotent, and
//! a reader from an earlier connection never tears down a newer one: each
//! connection carries a generation number that the reader checks.

use super::error::{Result, RpcError};
use super::protocol::{
    InitializeParams, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    METHOD_CALL_TOOL, METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_LIST_TOOLS, ToolCallParams,
    tool_outcome_from_result,
};
use super::spawn::{WorkerLaunch, spawn_ranked};
use super::timeout::{TimeoutPolicy, operation_label};
use super::transport::{Frame, MessageKind, classify_message, parse_frame};
use crate::framing::LineBuffer;
use futures::future::join_all;
use questkeeper_application::ToolCallRequest;
use questkeeper_domain::util::preview;
use questkeeper_domain::{ToolDescriptor, ToolError, ToolOutcome};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Stderr lines containing any of these are routine worker chatter.
pub const DEFAULT_STDERR_FILTERS: &[&str] = &["[SQLite]", "running on stdio"];

/// Responses slower than this are logged at info level.
pub const DEFAULT_SLOW_RESPONSE: Duration = Duration::from_secs(5);

const READ_CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// A process is attached but the handshake has not completed.
    Connecting,
    Ready,
}

type SharedWriter = Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// One request awaiting its response.
struct PendingRequest {
    operation: String,
    submitted_at: Instant,
    tx: oneshot::Sender<Result<Value>>,
}

struct Connection {
    generation: u64,
    writer: SharedWriter,
    child: Option<Child>,
    tasks: Vec<JoinHandle<()>>,
}

struct Shared {
    state: ConnectionState,
    generation: u64,
    pending: HashMap<u64, PendingRequest>,
    connection: Option<Connection>,
    /// Bytes the reader holds without a terminating newline.
    buffered_bytes: usize,
}

/// Removes a request's pending entry when its caller goes away, whether the
/// request completed, timed out or was dropped mid-flight.
struct PendingGuard<'a> {
    inner: &'a Inner,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        // A no-op once a response or teardown has taken the entry.
        self.inner.lock().pending.remove(&self.id);
    }
}

/// State touched by both the client and its background tasks.
struct Inner {
    name: String,
    shared: Mutex<Shared>,
    slow_response: Duration,
    stderr_filters: Vec<String>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Tear down the current connection.
    ///
    /// With `generation` set, only the connection of that generation is
    /// torn down; a newer connection is left alone.
    fn teardown(&self, generation: Option<u64>, reason: &str) {
        let (pending, connection) = {
            let mut shared = self.lock();
            let current = shared.connection.as_ref().map(|c| c.generation);
            if let Some(generation) = generation
                && current != Some(generation)
            {
                trace!(
                    "RpcClient[{}]: ignoring teardown from stale generation {}",
                    self.name, generation
                );
                return;
            }
            shared.state = ConnectionState::Disconnected;
            shared.buffered_bytes = 0;
            (std::mem::take(&mut shared.pending), shared.connection.take())
        };

        if let Some(mut connection) = connection {
            info!(
                "RpcClient[{}]: disconnected ({}), rejecting {} pending request(s)",
                self.name,
                reason,
                pending.len()
            );
            if let Some(child) = connection.child.as_mut() {
                let _ = child.start_kill();
            }
            for task in connection.tasks {
                task.abort();
            }
        }

        for (_, request) in pending {
            let _ = request.tx.send(Err(RpcError::disconnected(&self.name)));
        }
    }

    fn resolve(&self, id: u64, message: Value) {
        let Some(request) = self.lock().pending.remove(&id) else {
            // Usually a late response to a request that already timed out.
            debug!("RpcClient[{}]: no pending request for id {}", self.name, id);
            return;
        };

        let elapsed = request.submitted_at.elapsed();
        if elapsed > self.slow_response {
            info!(
                "RpcClient[{}]: slow response for {} ({}ms)",
                self.name,
                request.operation,
                elapsed.as_millis()
            );
        }

        let result = serde_json::from_value::<JsonRpcResponse>(message)
            .map_err(RpcError::from)
            .and_then(JsonRpcResponse::into_result);
        let _ = request.tx.send(result);
    }

    fn dispatch_line(&self, line: &str) {
        match parse_frame(line) {
            Frame::Empty => {}
            Frame::Log(text) => debug!("RpcClient[{}] stdout: {}", self.name, text),
            Frame::Malformed { line, error } => warn!(
                "RpcClient[{}]: protocol error: {} in {}",
                self.name,
                error,
                preview(&line, 200)
            ),
            Frame::Message(message) => match classify_message(&message) {
                MessageKind::Response { id } => self.resolve(id, message),
                MessageKind::IncomingRequest { id, method } => warn!(
                    "RpcClient[{}]: ignoring worker request {} (id {})",
                    self.name, method, id
                ),
                MessageKind::Notification { method } => {
                    trace!("RpcClient[{}]: notification {}", self.name, method)
                }
                MessageKind::Unknown => warn!(
                    "RpcClient[{}]: uncorrelated message: {}",
                    self.name,
                    preview(&message.to_string(), 200)
                ),
            },
        }
    }

    fn set_buffered_bytes(&self, generation: u64, bytes: usize) {
        let mut shared = self.lock();
        if shared.connection.as_ref().map(|c| c.generation) == Some(generation) {
            shared.buffered_bytes = bytes;
        }
    }
}

/// Single owner of the worker's stdout.
async fn read_loop<R>(inner: Arc<Inner>, mut reader: R, generation: u64)
where
    R: AsyncRead + Unpin,
{
    let mut lines = LineBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("RpcClient[{}]: read failed: {}", inner.name, e);
                break;
            }
        };
        for line in lines.push(&chunk[..n]) {
            inner.dispatch_line(&line);
        }
        inner.set_buffered_bytes(generation, lines.pending_bytes());
    }

    if let Some(rest) = lines.take_remainder() {
        inner.dispatch_line(&rest);
    }
    inner.teardown(Some(generation), "worker output closed");
}

async fn stderr_loop(inner: Arc<Inner>, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if inner.stderr_filters.iter().any(|f| line.contains(f.as_str())) {
            debug!("RpcClient[{}] stderr: {}", inner.name, line);
        } else {
            warn!("RpcClient[{}] stderr: {}", inner.name, line);
        }
    }
}

/// JSON-RPC client for one named worker process.
pub struct RpcClient {
    inner: Arc<Inner>,
    launch: WorkerLaunch,
    timeouts: TimeoutPolicy,
    next_id: AtomicU64,
    /// Serializes connect and initialize.
    lifecycle: tokio::sync::Mutex<()>,
}

impl RpcClient {
    pub fn new(launch: WorkerLaunch) -> Self {
        Self::with_options(launch, TimeoutPolicy::default(), DEFAULT_SLOW_RESPONSE, default_filters())
    }

    pub fn with_options(
        launch: WorkerLaunch,
        timeouts: TimeoutPolicy,
        slow_response: Duration,
        stderr_filters: Vec<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: launch.name.clone(),
                shared: Mutex::new(Shared {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    pending: HashMap::new(),
                    connection: None,
                    buffered_bytes: 0,
                }),
                slow_response,
                stderr_filters,
            }),
            launch,
            timeouts,
            next_id: AtomicU64::new(1),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Requests still awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    fn has_connection(&self) -> bool {
        self.inner.lock().connection.is_some()
    }

    /// Start the worker. No-op while a process is attached.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.connect_locked().await
    }

    async fn connect_locked(&self) -> Result<()> {
        if self.has_connection() {
            return Ok(());
        }
        // Clear anything left by the previous process before respawning.
        self.inner.teardown(None, "reconnect");
        self.inner.lock().state = ConnectionState::Connecting;

        let mut spawned = match spawn_ranked(&self.launch).await {
            Ok(spawned) => spawned,
            Err(e) => {
                self.inner.lock().state = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        let (Some(stdin), Some(stdout)) = (spawned.child.stdin.take(), spawned.child.stdout.take())
        else {
            let _ = spawned.child.start_kill();
            self.inner.lock().state = ConnectionState::Disconnected;
            return Err(RpcError::Protocol("worker stdio was not captured".into()));
        };
        let stderr = spawned.child.stderr.take();
        self.attach_io(stdout, stdin, Some(spawned.child), stderr);
        Ok(())
    }

    /// Attach the byte streams of a started worker and start the reader.
    ///
    /// Returns the generation of the new connection.
    pub(crate) fn attach_io<R, W>(
        &self,
        reader: R,
        writer: W,
        child: Option<Child>,
        stderr: Option<ChildStderr>,
    ) -> u64
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut shared = self.inner.lock();
        shared.generation += 1;
        let generation = shared.generation;

        let mut tasks = vec![tokio::spawn(read_loop(
            Arc::clone(&self.inner),
            reader,
            generation,
        ))];
        if let Some(stderr) = stderr {
            tasks.push(tokio::spawn(stderr_loop(Arc::clone(&self.inner), stderr)));
        }

        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        shared.connection = Some(Connection {
            generation,
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            child,
            tasks,
        });
        shared.state = ConnectionState::Connecting;
        shared.buffered_bytes = 0;
        debug!("RpcClient[{}]: attached connection #{}", self.inner.name, generation);
        generation
    }

    /// Connect if needed and perform the protocol handshake.
    ///
    /// Idempotent: a Ready client returns immediately. A failed handshake
    /// tears the connection down so the next call starts fresh.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if self.is_ready() {
            return Ok(());
        }
        self.connect_locked().await?;

        let params = serde_json::to_value(InitializeParams::default())?;
        let handshake = async {
            let result = self.request(METHOD_INITIALIZE, Some(params), None).await?;
            self.notify(METHOD_INITIALIZED, None).await?;
            Ok::<_, RpcError>(result)
        };

        match handshake.await {
            Ok(result) => {
                let server = result
                    .get("serverInfo")
                    .and_then(|info| info.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                self.inner.lock().state = ConnectionState::Ready;
                info!("RpcClient[{}]: ready (server: {})", self.inner.name, server);
                Ok(())
            }
            Err(e) => {
                warn!("RpcClient[{}]: handshake failed: {}", self.inner.name, e);
                self.inner.teardown(None, "handshake failed");
                Err(e)
            }
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(RpcError::NotInitialized {
                worker: self.inner.name.clone(),
            })
        }
    }

    /// The worker's tool catalog.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.ensure_ready()?;
        let result = self.request(METHOD_LIST_TOOLS, None, None).await?;
        let parsed: ListToolsResult = serde_json::from_value(result)?;
        Ok(parsed.tools)
    }

    /// Call one tool.
    ///
    /// Worker-reported failures (an `isError` result or a JSON-RPC error
    /// object) come back as [`ToolOutcome::Failure`]; only transport
    /// failures are `Err`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutcome> {
        self.ensure_ready()?;
        let params = serde_json::to_value(ToolCallParams {
            name,
            arguments: &arguments,
        })?;
        match self.request(METHOD_CALL_TOOL, Some(params), Some(name)).await {
            Ok(payload) => Ok(tool_outcome_from_result(payload)),
            Err(RpcError::Rpc {
                code,
                message,
                data,
            }) => Ok(ToolOutcome::Failure(ToolError::from_worker(code, message, data))),
            Err(e) => Err(e),
        }
    }

    /// Issue all calls at once and gather their results in order.
    pub async fn call_tools_batch(&self, calls: Vec<ToolCallRequest>) -> Vec<Result<ToolOutcome>> {
        join_all(
            calls
                .into_iter()
                .map(|call| async move { self.call_tool(&call.name, call.arguments).await }),
        )
        .await
    }

    /// Tear down the connection, rejecting everything pending.
    pub fn disconnect(&self) {
        self.inner.teardown(None, "disconnect requested");
    }

    /// Send a request and wait for its response under the policy deadline.
    async fn request(&self, method: &str, params: Option<Value>, tool: Option<&str>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let operation = operation_label(method, tool);
        let deadline = self.timeouts.for_request(method, tool);
        let (tx, rx) = oneshot::channel();
        let submitted_at = Instant::now();

        let writer = {
            let mut shared = self.inner.lock();
            let Some(connection) = shared.connection.as_ref() else {
                return Err(RpcError::disconnected(&self.inner.name));
            };
            let writer = Arc::clone(&connection.writer);
            if shared.pending.contains_key(&id) {
                return Err(RpcError::DuplicateRequestId(id));
            }
            shared.pending.insert(
                id,
                PendingRequest {
                    operation: operation.clone(),
                    submitted_at,
                    tx,
                },
            );
            writer
        };
        let _guard = PendingGuard {
            inner: &self.inner,
            id,
        };

        let request = JsonRpcRequest::new(id, method, params);
        self.write_message(&writer, &request).await?;

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RpcError::disconnected(&self.inner.name)),
            Err(_) => {
                let (pending, buffered) = {
                    let mut shared = self.inner.lock();
                    shared.pending.remove(&id);
                    (shared.pending.len(), shared.buffered_bytes)
                };
                let elapsed = submitted_at.elapsed();
                warn!(
                    "RpcClient[{}]: {} timed out after {}ms ({} still pending, {} bytes buffered)",
                    self.inner.name,
                    operation,
                    elapsed.as_millis(),
                    pending,
                    buffered
                );
                Err(RpcError::Timeout { operation, elapsed })
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let writer = {
            let shared = self.inner.lock();
            let Some(connection) = shared.connection.as_ref() else {
                return Err(RpcError::disconnected(&self.inner.name));
            };
            Arc::clone(&connection.writer)
        };
        self.write_message(&writer, &JsonRpcNotification::new(method, params))
            .await
    }

    async fn write_message<T: serde::Serialize>(&self, writer: &SharedWriter, message: &T) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        trace!("RpcClient[{}] sending: {}", self.inner.name, line);
        line.push('\n');

        let mut writer = writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.inner.teardown(None, "client dropped");
    }
}

fn default_filters() -> Vec<String> {
    DEFAULT_STDERR_FILTERS.iter().map(|s| s.to_string()).collect()
}
