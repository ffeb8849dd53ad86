#![forbid(unsafe_code)]

//! Control-plane session engine for stream-json coding agents.
//!
//! A [`Session`] runs a typed bidirectional conversation with a coding
//! agent over newline-delimited JSON: user turns go out, conversation
//! messages come back in arrival order, and a control channel multiplexed
//! onto the same stream carries permission checks, tool-server bridging,
//! interrupts, and runtime reconfiguration in both directions.

pub mod errors;
pub mod mcp;
pub mod options;
pub mod protocol;
pub mod session;
pub mod transport;

pub use errors::{Result, SdkError};
pub use mcp::tool_server::{SdkTool, ToolServer};
pub use mcp::{McpChannel, McpServerConfig, SdkMcpServer};
pub use options::{InputMode, PermissionCallback, SessionOptions, Timeouts};
pub use protocol::control::{Capabilities, InitializeResult, SlashCommand};
pub use protocol::permission::{PermissionMode, PermissionRequest, PermissionResult};
pub use protocol::{ContentBlock, Message, MessageContent, UserInput};
pub use session::Session;
pub use transport::process::{ProcessConfig, ProcessTransport};
pub use transport::Transport;
