//! Tool-server declarations and the in-process server seam.
//!
//! External servers ([`McpServerConfig`]) are declared to the remote agent
//! during the initialize handshake and managed entirely on its side.
//! In-process servers ([`SdkMcpServer`]) run inside this process and are
//! bridged onto the control channel through private [`McpChannel`]
//! sub-transports.

pub mod tool_server;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::errors::Result;

/// Declaration of a tool server the remote agent manages itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpServerConfig {
    /// Child process speaking MCP over stdio.
    Stdio {
        /// Executable to launch.
        command: String,
        /// Arguments passed to the executable.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        /// Environment variables set for the process.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
    /// Server-sent-events endpoint.
    Sse {
        /// Endpoint URL.
        url: String,
        /// Headers attached to the connection request.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
    /// Streamable HTTP endpoint.
    Http {
        /// Endpoint URL.
        url: String,
        /// Headers attached to each request.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
}

/// Private sub-transport pair connecting the engine to one in-process server.
#[derive(Debug)]
pub struct McpChannel {
    /// Engine-to-server frames.
    pub to_server: mpsc::Sender<Value>,
    /// Server-to-engine frames.
    pub from_server: mpsc::Receiver<Value>,
}

/// An in-process MCP server bridged onto the control channel.
pub trait SdkMcpServer: Send + Sync {
    /// Server name; keys the bridge registry and the initialize listing.
    fn name(&self) -> &str;

    /// Connect the server to a fresh private sub-transport.
    ///
    /// Called once per session, before the initialize handshake is sent. A
    /// failure drops this server from the session without affecting the
    /// others.
    ///
    /// # Errors
    ///
    /// Implementations return any [`SdkError`](crate::SdkError) when the
    /// server cannot be brought up.
    fn connect(&self) -> Pin<Box<dyn Future<Output = Result<McpChannel>> + Send + '_>>;
}
