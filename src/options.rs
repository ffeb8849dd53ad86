//! Session configuration.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::{Result, SdkError};
use crate::mcp::{McpServerConfig, SdkMcpServer};
use crate::protocol::permission::{PermissionRequest, PermissionResult};

/// Message queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Host-side permission callback invoked for each `can_use_tool` request.
pub type PermissionCallback = Arc<
    dyn Fn(PermissionRequest) -> Pin<Box<dyn Future<Output = Result<PermissionResult>> + Send>>
        + Send
        + Sync,
>;

/// Whether the session receives one prompt or an open-ended sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// One prompt up front; input ends automatically after the first result.
    SingleTurn,
    /// Open-ended prompt sequence; the caller ends input explicitly.
    #[default]
    MultiTurn,
}

/// Per-concern timeouts.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Bound on one permission callback invocation.
    pub can_use_tool: Duration,
    /// Bound on one outbound control request round trip.
    pub control_request: Duration,
    /// Bound on one embedded-server round trip.
    pub mcp_request: Duration,
    /// Grace period before input closes while awaiting the first result.
    pub stream_close: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            can_use_tool: Duration::from_secs(60),
            control_request: Duration::from_secs(60),
            mcp_request: Duration::from_secs(30),
            stream_close: Duration::from_secs(10),
        }
    }
}

/// Configuration for [`Session::new`](crate::Session::new).
pub struct SessionOptions {
    /// Permission callback; when absent every `can_use_tool` is denied.
    pub can_use_tool: Option<PermissionCallback>,
    /// Tool servers the remote agent manages itself, by name.
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    /// In-process tool servers bridged onto the control channel.
    pub sdk_mcp_servers: Vec<Arc<dyn SdkMcpServer>>,
    /// Agent definitions forwarded verbatim during the handshake.
    pub agents: Option<Value>,
    /// Caller-supplied cancellation signal; the session makes its own when
    /// absent.
    pub abort: Option<CancellationToken>,
    /// Single-turn or multi-turn lifecycle.
    pub input_mode: InputMode,
    /// Per-concern timeout overrides.
    pub timeouts: Timeouts,
    /// Message queue capacity before routing backpressures. Must be at
    /// least 1; [`DEFAULT_QUEUE_CAPACITY`] when left alone.
    pub queue_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            can_use_tool: None,
            mcp_servers: BTreeMap::new(),
            sdk_mcp_servers: Vec::new(),
            agents: None,
            abort: None,
            input_mode: InputMode::default(),
            timeouts: Timeouts::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl SessionOptions {
    /// Check the configuration for inconsistencies.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] for duplicate in-process server names,
    /// a name declared both externally and in-process, or a zero queue
    /// capacity.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for server in &self.sdk_mcp_servers {
            let name = server.name();
            if !seen.insert(name.to_owned()) {
                return Err(SdkError::Config(format!(
                    "duplicate sdk mcp server name '{name}'"
                )));
            }
            if self.mcp_servers.contains_key(name) {
                return Err(SdkError::Config(format!(
                    "mcp server name '{name}' is declared both externally and in-process"
                )));
            }
        }
        if self.queue_capacity == 0 {
            return Err(SdkError::Config("queue capacity must be at least 1".into()));
        }
        Ok(())
    }
}
