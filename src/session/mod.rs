//! Session orchestration over a stream-json transport.
//!
//! [`Session`] owns the background routing loop, the pending-request
//! tables, the embedded tool-server bridge, and the ordered message queue,
//! and exposes the conversation API: streaming input in, pulling messages
//! out, and issuing control requests to the remote agent.

mod control;
mod pending;
mod queue;
mod router;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{Result, SdkError};
use crate::mcp::{McpServerConfig, SdkMcpServer};
use crate::options::{InputMode, PermissionCallback, SessionOptions, Timeouts};
use crate::protocol::control::{request_frame, Capabilities, InitializeResult, SlashCommand};
use crate::protocol::permission::PermissionMode;
use crate::protocol::{Message, UserInput};
use crate::transport::Transport;

use pending::{CrossCalls, PendingControls};
use queue::{EndReason, QueueReceiver, QueueState};

/// Initialize handshake progress.
#[derive(Debug, Clone)]
enum InitState {
    /// Handshake still in flight.
    Pending,
    /// Handshake answered; control requests may proceed.
    Ready(InitializeResult),
    /// Handshake failed or the session closed first.
    Failed(SdkError),
}

/// State shared between the session handle and its background tasks.
pub(crate) struct SessionInner {
    session_id: String,
    transport: Arc<dyn Transport>,
    pending: PendingControls,
    cross_calls: CrossCalls,
    /// Engine-to-server senders for connected in-process servers.
    servers: Mutex<HashMap<String, mpsc::Sender<Value>>>,
    init_state: watch::Sender<InitState>,
    /// Flips to true when the first result message arrives.
    first_result: watch::Sender<bool>,
    closed: AtomicBool,
    /// Caller-facing cancellation signal.
    abort: CancellationToken,
    /// Internal stop signal for background tasks.
    shutdown: CancellationToken,
    can_use_tool: Option<PermissionCallback>,
    timeouts: Timeouts,
    single_turn: bool,
    queue_state: QueueState,
}

impl SessionInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(SdkError::Closed)
        } else {
            Ok(())
        }
    }

    async fn write_frame(&self, frame: &Value) -> Result<()> {
        self.transport.write(frame.to_string()).await
    }

    fn note_result(&self) {
        self.first_result.send_replace(true);
    }

    async fn server_sender(&self, name: &str) -> Option<mpsc::Sender<Value>> {
        self.servers.lock().await.get(name).cloned()
    }

    async fn has_servers(&self) -> bool {
        !self.servers.lock().await.is_empty()
    }

    /// Move the handshake out of `Pending`. Later calls are no-ops, so the
    /// first outcome recorded wins.
    fn set_init_state(&self, next: InitState) {
        self.init_state.send_if_modified(|state| {
            if matches!(state, InitState::Pending) {
                *state = next;
                true
            } else {
                false
            }
        });
    }

    /// Wait for the handshake outcome, racing the cancellation signal.
    async fn wait_ready(&self) -> Result<InitializeResult> {
        let mut state_rx = self.init_state.subscribe();
        tokio::select! {
            biased;
            () = self.abort.cancelled() => Err(SdkError::Aborted),
            changed = state_rx.wait_for(|state| !matches!(state, InitState::Pending)) => {
                match changed {
                    Ok(state) => match &*state {
                        InitState::Ready(result) => Ok(result.clone()),
                        InitState::Failed(err) => Err(err.clone()),
                        InitState::Pending => Err(SdkError::Closed),
                    },
                    Err(_) => Err(SdkError::Closed),
                }
            }
        }
    }

    /// Issue one outbound control request and wait for its response.
    ///
    /// The pending entry is registered before the frame is written so a
    /// fast response cannot miss it, and removed on every non-response
    /// exit so the table never leaks.
    async fn send_control_request(&self, request: Value, await_init: bool) -> Result<Value> {
        self.ensure_open()?;
        if await_init {
            self.wait_ready().await?;
        }
        let subtype = request
            .get("subtype")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned();
        let request_id = Uuid::new_v4().to_string();
        let waiter = self.pending.register(&request_id).await;
        let frame = request_frame(&request_id, request);
        if let Err(err) = self.write_frame(&frame).await {
            self.pending.remove(&request_id).await;
            return Err(err);
        }
        let timeout = self.timeouts.control_request;
        tokio::select! {
            biased;
            () = self.abort.cancelled() => {
                self.pending.remove(&request_id).await;
                Err(SdkError::Aborted)
            }
            outcome = waiter => match outcome {
                Ok(result) => result,
                Err(_) => Err(SdkError::Closed),
            },
            () = sleep(timeout) => {
                self.pending.remove(&request_id).await;
                Err(SdkError::Timeout(format!(
                    "control request '{subtype}' after {}s",
                    timeout.as_secs()
                )))
            }
        }
    }

    /// Outbound user-turn frame for one input item.
    fn user_frame(&self, input: &UserInput) -> Value {
        json!({
            "type": "user",
            "session_id": &self.session_id,
            "message": { "role": "user", "content": &input.content },
            "parent_tool_use_id": &input.parent_tool_use_id,
        })
    }

    /// Tear the session down. Idempotent; the first caller does the work.
    async fn close_internal(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(session_id = self.session_id.as_str(), "closing session");
        self.set_init_state(InitState::Failed(SdkError::Closed));
        let reason = if self.abort.is_cancelled() {
            EndReason::Aborted
        } else {
            EndReason::Done
        };
        queue::finish_queue(&self.queue_state, reason).await;
        self.pending.fail_all(&SdkError::Closed).await;
        self.cross_calls.clear().await;
        self.shutdown.cancel();
        if let Err(err) = self.transport.close().await {
            warn!(error = %err, "transport close failed");
        }
        let servers: Vec<(String, mpsc::Sender<Value>)> =
            self.servers.lock().await.drain().collect();
        for (name, sender) in servers {
            drop(sender);
            debug!(server = name.as_str(), "sdk mcp server sub-transport closed");
        }
    }
}

/// A typed bidirectional session with a stream-json coding agent.
///
/// Constructing a session spawns its routing loop and starts the initialize
/// handshake in the background; the handle is usable immediately. Dropping
/// the handle stops the background tasks.
pub struct Session {
    inner: Arc<SessionInner>,
    message_queue: QueueReceiver,
    init_failure_reported: bool,
}

impl Session {
    /// Start a session over `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] when `options` are inconsistent, or
    /// [`SdkError::Transport`] when the transport's message stream was
    /// already taken.
    pub async fn new(transport: Arc<dyn Transport>, options: SessionOptions) -> Result<Self> {
        options.validate()?;
        let SessionOptions {
            can_use_tool,
            mcp_servers,
            sdk_mcp_servers,
            agents,
            abort,
            input_mode,
            timeouts,
            queue_capacity,
        } = options;
        let inbound = transport.take_messages().await?;
        let (queue_tx, queue_rx, queue_state) = queue::message_queue(queue_capacity);
        let (init_tx, _) = watch::channel(InitState::Pending);
        let (result_tx, _) = watch::channel(false);
        let inner = Arc::new(SessionInner {
            session_id: Uuid::new_v4().to_string(),
            transport,
            pending: PendingControls::default(),
            cross_calls: CrossCalls::default(),
            servers: Mutex::new(HashMap::new()),
            init_state: init_tx,
            first_result: result_tx,
            closed: AtomicBool::new(false),
            abort: abort.unwrap_or_default(),
            shutdown: CancellationToken::new(),
            can_use_tool,
            timeouts,
            single_turn: input_mode == InputMode::SingleTurn,
            queue_state,
        });
        debug!(session_id = inner.session_id.as_str(), "session starting");
        tokio::spawn(router::run_router(Arc::clone(&inner), inbound, queue_tx));
        let watcher = Arc::clone(&inner);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = watcher.shutdown.cancelled() => {}
                () = watcher.abort.cancelled() => watcher.close_internal().await,
            }
        });
        tokio::spawn(run_initialize(
            Arc::clone(&inner),
            sdk_mcp_servers,
            mcp_servers,
            agents,
        ));
        Ok(Self {
            inner,
            message_queue: queue_rx,
            init_failure_reported: false,
        })
    }

    /// Next message in arrival order.
    ///
    /// Returns `None` once the session ends cleanly. An initialize failure
    /// is reported here as one `Err`, after which iteration continues with
    /// whatever the stream still delivers.
    pub async fn next_message(&mut self) -> Option<Result<Message>> {
        if self.init_failure_reported {
            return self.message_queue.next().await;
        }
        let mut init_rx = self.inner.init_state.subscribe();
        let failure = tokio::select! {
            biased;
            message = self.message_queue.next() => return message,
            failed = init_rx.wait_for(|state| matches!(state, InitState::Failed(_))) => {
                match failed {
                    Ok(state) => match &*state {
                        InitState::Failed(err) => err.clone(),
                        _ => SdkError::Closed,
                    },
                    Err(_) => SdkError::Closed,
                }
            }
        };
        self.init_failure_reported = true;
        if matches!(failure, SdkError::Closed) {
            // A plain close during the handshake ends the queue instead.
            return self.message_queue.next().await;
        }
        Some(Err(failure))
    }

    /// Send every item of `inputs` as a user turn, then end input.
    ///
    /// With in-process servers attached, the input side stays open after
    /// the last item until the first result arrives or a grace period
    /// elapses, so late tool round trips are not cut off.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Aborted`] when cancellation fires mid-stream,
    /// [`SdkError::Closed`] when the session closes mid-stream, or any
    /// transport error from writing a frame.
    pub async fn stream_input<S>(&self, mut inputs: S) -> Result<()>
    where
        S: Stream<Item = UserInput> + Send + Unpin,
    {
        self.inner.ensure_open()?;
        self.inner.wait_ready().await?;
        loop {
            let next = tokio::select! {
                biased;
                () = self.inner.abort.cancelled() => return Err(SdkError::Aborted),
                item = inputs.next() => item,
            };
            let Some(input) = next else { break };
            self.inner.ensure_open()?;
            let frame = self.inner.user_frame(&input);
            self.inner.write_frame(&frame).await?;
        }
        if !self.inner.single_turn && self.inner.has_servers().await {
            let mut first_result = self.inner.first_result.subscribe();
            tokio::select! {
                biased;
                () = self.inner.abort.cancelled() => return Err(SdkError::Aborted),
                () = self.inner.shutdown.cancelled() => return Err(SdkError::Closed),
                changed = first_result.wait_for(|seen| *seen) => {
                    changed.map_err(|_| SdkError::Closed)?;
                }
                () = sleep(self.inner.timeouts.stream_close) => {
                    debug!(
                        session_id = self.inner.session_id.as_str(),
                        "input close grace elapsed before first result"
                    );
                }
            }
        }
        self.inner.transport.end_input().await
    }

    /// Close the input side without sending anything further.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Closed`] when the session is closed, or a
    /// transport error from closing the input stream.
    pub async fn end_input(&self) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.transport.end_input().await
    }

    /// Ask the remote agent to stop the current turn.
    ///
    /// # Errors
    ///
    /// Fails with the control request's outcome; see
    /// [`SdkError::Control`] and [`SdkError::Timeout`].
    pub async fn interrupt(&self) -> Result<()> {
        self.inner
            .send_control_request(json!({ "subtype": "interrupt" }), true)
            .await?;
        Ok(())
    }

    /// Switch the remote agent's permission mode.
    ///
    /// # Errors
    ///
    /// Fails with the control request's outcome.
    pub async fn set_permission_mode(&self, mode: PermissionMode) -> Result<()> {
        self.inner
            .send_control_request(json!({ "subtype": "set_permission_mode", "mode": mode }), true)
            .await?;
        Ok(())
    }

    /// Switch the remote agent's model; `None` restores its default.
    ///
    /// # Errors
    ///
    /// Fails with the control request's outcome.
    pub async fn set_model(&self, model: Option<&str>) -> Result<()> {
        self.inner
            .send_control_request(json!({ "subtype": "set_model", "model": model }), true)
            .await?;
        Ok(())
    }

    /// Slash commands the remote agent accepts.
    ///
    /// An absent `commands` payload means the agent reports none.
    ///
    /// # Errors
    ///
    /// Fails with the control request's outcome, or with
    /// [`SdkError::Protocol`] when a present listing cannot be parsed.
    pub async fn supported_commands(&self) -> Result<Vec<SlashCommand>> {
        let payload = self
            .inner
            .send_control_request(json!({ "subtype": "supported_commands" }), true)
            .await?;
        match payload.get("commands") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(listing) => serde_json::from_value(listing.clone())
                .map_err(|err| SdkError::Protocol(format!("malformed command listing: {err}"))),
        }
    }

    /// Status of the tool servers the remote agent manages, verbatim.
    ///
    /// # Errors
    ///
    /// Fails with the control request's outcome.
    pub async fn mcp_server_status(&self) -> Result<Value> {
        self.inner
            .send_control_request(json!({ "subtype": "mcp_server_status" }), true)
            .await
    }

    /// Outcome of the initialize handshake, waiting for it if needed.
    ///
    /// # Errors
    ///
    /// Returns the handshake failure, or [`SdkError::Aborted`] when
    /// cancellation fires first.
    pub async fn initialize_result(&self) -> Result<InitializeResult> {
        self.inner.wait_ready().await
    }

    /// Identifier attached to outbound user turns.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Whether the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Close the session: stop background tasks, reject in-flight
    /// requests, and release the transport. Repeated calls are no-ops.
    ///
    /// # Errors
    ///
    /// Currently infallible; the signature leaves room for transports
    /// whose release can fail.
    pub async fn close(&self) -> Result<()> {
        self.inner.close_internal().await;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

/// Connect in-process servers, then run the initialize handshake.
async fn run_initialize(
    inner: Arc<SessionInner>,
    sdk_servers: Vec<Arc<dyn SdkMcpServer>>,
    external_servers: BTreeMap<String, McpServerConfig>,
    agents: Option<Value>,
) {
    let mut connected: Vec<String> = Vec::new();
    for server in sdk_servers {
        let name = server.name().to_owned();
        match server.connect().await {
            Ok(channel) => {
                inner
                    .servers
                    .lock()
                    .await
                    .insert(name.clone(), channel.to_server);
                tokio::spawn(pump_server(
                    Arc::clone(&inner),
                    name.clone(),
                    channel.from_server,
                ));
                connected.push(name);
            }
            Err(err) => {
                warn!(
                    server = name.as_str(),
                    error = %err,
                    "sdk mcp server failed to connect, dropping from session"
                );
            }
        }
    }
    let capabilities = Capabilities {
        can_handle_can_use_tool: inner.can_use_tool.is_some(),
        can_handle_hook_callback: false,
        can_handle_mcp_message: !connected.is_empty(),
        can_set_permission_mode: true,
        can_set_model: true,
    };
    let mut request = json!({
        "subtype": "initialize",
        "capabilities": capabilities,
        "sdkMcpServers": connected,
    });
    if let Value::Object(map) = &mut request {
        if !external_servers.is_empty() {
            if let Ok(value) = serde_json::to_value(&external_servers) {
                map.insert("mcpServers".to_owned(), value);
            }
        }
        if let Some(agents) = agents {
            map.insert("agents".to_owned(), agents);
        }
    }
    match inner.send_control_request(request, false).await {
        Ok(payload) => {
            let result: InitializeResult = serde_json::from_value(payload).unwrap_or_default();
            debug!(
                session_id = inner.session_id.as_str(),
                commands = result.commands.len(),
                "initialize handshake complete"
            );
            inner.set_init_state(InitState::Ready(result));
        }
        Err(err) => {
            warn!(
                session_id = inner.session_id.as_str(),
                error = %err,
                "initialize handshake failed"
            );
            inner.set_init_state(InitState::Failed(err));
        }
    }
}

/// Deliver one server's outbound frames to their cross-call waiters.
async fn pump_server(
    inner: Arc<SessionInner>,
    name: String,
    mut from_server: mpsc::Receiver<Value>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            () = inner.shutdown.cancelled() => break,
            frame = from_server.recv() => frame,
        };
        let Some(frame) = frame else {
            debug!(server = name.as_str(), "sdk mcp server stream ended");
            break;
        };
        let key = match frame.get("id").filter(|id| !id.is_null()) {
            Some(id) => pending::message_key(id),
            None => {
                debug!(server = name.as_str(), "dropping server frame without id");
                continue;
            }
        };
        if !inner.cross_calls.resolve(&name, &key, frame).await {
            debug!(
                server = name.as_str(),
                message_id = key.as_str(),
                "no waiter for server frame, dropping"
            );
        }
    }
}
