//! Child-process transport.
//!
//! Spawns the agent CLI with `kill_on_drop(true)` and speaks newline-delimited
//! JSON over its stdio: stdout is framed by [`NdjsonCodec`] and parsed into
//! frames for the orchestrator, stderr is drained to the log, stdin carries
//! outbound frames until the input side is ended.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{Result, SdkError};
use crate::protocol::permission::PermissionMode;
use crate::transport::codec::NdjsonCodec;
use crate::transport::Transport;

/// Capacity of the inbound frame channel between the reader task and the
/// orchestrator.
pub const INBOUND_CAPACITY: usize = 128;

// ── Configuration ────────────────────────────────────────────────────────────

/// Configuration for spawning an agent CLI process.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Agent CLI binary: an absolute path or a name resolved via `PATH`.
    pub program: String,
    /// Extra arguments appended after the generated stream-json flags.
    pub args: Vec<String>,
    /// Working directory for the child; inherited when `None`.
    pub cwd: Option<PathBuf>,
    /// Environment overrides applied on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Model override passed as `--model`.
    pub model: Option<String>,
    /// Permission mode passed as `--permission-mode`.
    pub permission_mode: Option<PermissionMode>,
    /// Turn limit passed as `--max-session-turns`.
    pub max_session_turns: Option<u32>,
    /// Built-in tool set passed as `--core-tools`, comma-joined.
    pub core_tools: Vec<String>,
    /// Tool denylist passed as `--exclude-tools`, comma-joined.
    pub exclude_tools: Vec<String>,
    /// Tool allowlist passed as `--allowed-tools`, comma-joined.
    pub allowed_tools: Vec<String>,
    /// Authentication scheme passed as `--auth-type`.
    pub auth_type: Option<String>,
    /// Whether to request partial assistant frames while streaming.
    pub include_partial_messages: bool,
}

impl ProcessConfig {
    /// Configuration for `program` with stream-json defaults and nothing else.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            model: None,
            permission_mode: None,
            max_session_turns: None,
            core_tools: Vec::new(),
            exclude_tools: Vec::new(),
            allowed_tools: Vec::new(),
            auth_type: None,
            include_partial_messages: false,
        }
    }

    /// Full argument list for the child process.
    ///
    /// Always selects stream-json framing for both directions and marks the
    /// invocation as SDK-driven with `--channel=SDK`; every other flag is
    /// emitted only when the corresponding option is set. Caller extras from
    /// [`ProcessConfig::args`] come last.
    #[must_use]
    pub fn command_args(&self) -> Vec<String> {
        let mut args = vec![
            "--input-format".to_owned(),
            "stream-json".to_owned(),
            "--output-format".to_owned(),
            "stream-json".to_owned(),
            "--channel=SDK".to_owned(),
        ];
        if let Some(model) = &self.model {
            args.push("--model".to_owned());
            args.push(model.clone());
        }
        if let Some(mode) = self.permission_mode {
            args.push("--permission-mode".to_owned());
            args.push(mode.as_str().to_owned());
        }
        if let Some(turns) = self.max_session_turns {
            args.push("--max-session-turns".to_owned());
            args.push(turns.to_string());
        }
        if !self.core_tools.is_empty() {
            args.push("--core-tools".to_owned());
            args.push(self.core_tools.join(","));
        }
        if !self.exclude_tools.is_empty() {
            args.push("--exclude-tools".to_owned());
            args.push(self.exclude_tools.join(","));
        }
        if !self.allowed_tools.is_empty() {
            args.push("--allowed-tools".to_owned());
            args.push(self.allowed_tools.join(","));
        }
        if let Some(auth) = &self.auth_type {
            args.push("--auth-type".to_owned());
            args.push(auth.clone());
        }
        if self.include_partial_messages {
            args.push("--include-partial-messages".to_owned());
        }
        args.extend(self.args.iter().cloned());
        args
    }
}

// ── Transport ────────────────────────────────────────────────────────────────

/// Stdio transport over a spawned agent CLI process.
pub struct ProcessTransport {
    child: Mutex<Option<Child>>,
    writer: Mutex<Option<FramedWrite<ChildStdin, NdjsonCodec>>>,
    inbound: Mutex<Option<mpsc::Receiver<Result<Value>>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl ProcessTransport {
    /// Spawn the agent CLI and wire its stdio.
    ///
    /// The child carries `kill_on_drop(true)` so it cannot outlive the
    /// transport even if [`Transport::close`] is never called.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Transport`] if the OS spawn fails or a stdio
    /// handle cannot be captured.
    pub fn spawn(config: &ProcessConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.program);
        cmd.args(config.command_args());
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| SdkError::Transport(format!("failed to spawn agent process: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SdkError::Transport("failed to capture agent stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SdkError::Transport("failed to capture agent stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SdkError::Transport("failed to capture agent stderr".into()))?;

        let cancel = CancellationToken::new();
        let (frame_tx, frame_rx) = mpsc::channel(INBOUND_CAPACITY);
        let reader = tokio::spawn(run_reader(stdout, frame_tx, cancel.clone()));
        tokio::spawn(drain_stderr(stderr));

        Ok(Self {
            child: Mutex::new(Some(child)),
            writer: Mutex::new(Some(FramedWrite::new(stdin, NdjsonCodec::new()))),
            inbound: Mutex::new(Some(frame_rx)),
            reader: Mutex::new(Some(reader)),
            cancel,
        })
    }
}

impl Transport for ProcessTransport {
    fn write(&self, frame: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut guard = self.writer.lock().await;
            let writer = guard
                .as_mut()
                .ok_or_else(|| SdkError::Transport("input side is closed".into()))?;
            writer.send(frame).await
        })
    }

    fn take_messages(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<Result<Value>>>> + Send + '_>> {
        Box::pin(async move {
            self.inbound
                .lock()
                .await
                .take()
                .ok_or_else(|| SdkError::Transport("inbound receiver already taken".into()))
        })
    }

    fn end_input(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            // Dropping the framed writer closes the child's stdin.
            drop(self.writer.lock().await.take());
            Ok(())
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.cancel.cancel();
            drop(self.writer.lock().await.take());
            let child = self.child.lock().await.take();
            if let Some(mut child) = child {
                if let Err(err) = child.kill().await {
                    warn!(error = %err, "failed to kill agent process");
                }
            }
            let reader = self.reader.lock().await.take();
            if let Some(handle) = reader {
                if let Err(err) = handle.await {
                    warn!(error = %err, "agent reader task failed");
                }
            }
            Ok(())
        })
    }
}

// ── Background tasks ─────────────────────────────────────────────────────────

/// Read NDJSON frames from the child's stdout and forward them parsed.
///
/// Malformed JSON lines are logged and skipped. A codec or I/O error is
/// forwarded as the terminal `Err` item; EOF ends the channel cleanly.
/// Every forward races the cancellation token, so [`Transport::close`] can
/// join this task even while the frame channel is full.
async fn run_reader(
    stdout: ChildStdout,
    frame_tx: mpsc::Sender<Result<Value>>,
    cancel: CancellationToken,
) {
    let mut framed = FramedRead::new(stdout, NdjsonCodec::new());

    loop {
        let item = tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("transport reader: cancellation received, stopping");
                return;
            }

            item = framed.next() => item,
        };

        match item {
            None => {
                debug!("transport reader: EOF detected");
                return;
            }
            Some(Ok(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(&line) {
                    Ok(frame) => {
                        let delivered = tokio::select! {
                            biased;

                            () = cancel.cancelled() => {
                                debug!("transport reader: cancellation received, stopping");
                                return;
                            }

                            sent = frame_tx.send(Ok(frame)) => sent.is_ok(),
                        };
                        if !delivered {
                            debug!("transport reader: receiver dropped, stopping");
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "transport reader: malformed frame, skipping");
                    }
                }
            }
            Some(Err(err)) => {
                warn!(error = %err, "transport reader: stream error, stopping");
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => {}
                    _ = frame_tx.send(Err(err)) => {}
                }
                return;
            }
        }
    }
}

/// Drain the child's stderr line-by-line into the log.
async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(line = line.as_str(), "agent stderr"),
            Ok(None) => break,
            Err(err) => {
                debug!(error = %err, "agent stderr read failed, stopping drain");
                break;
            }
        }
    }
}
