//! Wire message model for the stream-json control channel.
//!
//! Inbound frames are classified by their `type` discriminator into typed
//! views. Classification never fails: frames with an unknown `type`, and
//! frames whose body does not match the expected shape, are preserved raw so
//! a peer upgrade cannot break an active session.

pub mod control;
pub mod permission;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One application-visible message delivered to the session consumer.
#[derive(Debug, Clone)]
pub enum Message {
    /// Session metadata emitted by the remote agent (`subtype: "init"`).
    System(SystemMessage),
    /// A user turn echoed or synthesized by the remote agent.
    User(UserMessage),
    /// An assistant turn; may be a partial update while streaming.
    Assistant(AssistantMessage),
    /// Terminal status for the current turn.
    Result(ResultMessage),
    /// Any frame this crate does not model, preserved verbatim.
    Other(Value),
}

impl Message {
    /// Classify one parsed inbound frame.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        match kind.as_str() {
            "system" => match SystemMessage::deserialize(&value) {
                Ok(msg) => Self::System(msg),
                Err(_) => Self::Other(value),
            },
            "user" => match UserMessage::deserialize(&value) {
                Ok(msg) => Self::User(msg),
                Err(_) => Self::Other(value),
            },
            "assistant" => match AssistantMessage::deserialize(&value) {
                Ok(msg) => Self::Assistant(msg),
                Err(_) => Self::Other(value),
            },
            "result" => match ResultMessage::deserialize(&value) {
                Ok(msg) => Self::Result(msg),
                Err(_) => Self::Other(value),
            },
            _ => Self::Other(value),
        }
    }
}

/// Session metadata frame (`type: "system"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMessage {
    /// Frame subtype; `"init"` carries the fields below.
    #[serde(default)]
    pub subtype: Option<String>,
    /// Remote-assigned session identifier.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Working directory of the remote agent.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Names of the tools available to the remote agent.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Tool servers the remote agent manages, with connection status.
    #[serde(default)]
    pub mcp_servers: Vec<McpServerInfo>,
    /// Active model identifier.
    #[serde(default)]
    pub model: Option<String>,
    /// Active permission mode.
    #[serde(default, rename = "permissionMode")]
    pub permission_mode: Option<String>,
    /// Slash commands the remote agent accepts.
    #[serde(default)]
    pub slash_commands: Vec<String>,
    /// Frame uuid assigned by the remote agent.
    #[serde(default)]
    pub uuid: Option<String>,
    /// Fields this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One remote-managed tool server as reported in a system frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerInfo {
    /// Server name.
    pub name: String,
    /// Connection status reported by the remote agent.
    #[serde(default)]
    pub status: Option<String>,
    /// Fields this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A user conversation turn (`type: "user"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessage {
    /// Frame uuid assigned by the sender.
    #[serde(default)]
    pub uuid: Option<String>,
    /// Session this turn belongs to.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Role and content of the turn.
    pub message: MessageBody,
    /// Id of the tool invocation this turn answers, for nested turns.
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
    /// Fields this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An assistant conversation turn (`type: "assistant"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Frame uuid assigned by the remote agent.
    #[serde(default)]
    pub uuid: Option<String>,
    /// Session this turn belongs to.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Role and content of the turn.
    pub message: MessageBody,
    /// Id of the tool invocation this turn answers, for nested turns.
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
    /// Fields this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Role and content carried inside a conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBody {
    /// `"user"` or `"assistant"`.
    pub role: String,
    /// Turn content, plain text or structured blocks.
    pub content: MessageContent,
    /// Fields this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Turn content: either a plain string or a list of typed blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content.
    Text(String),
    /// Structured content blocks.
    Blocks(Vec<ContentBlock>),
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<ContentBlock>> for MessageContent {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        Self::Blocks(blocks)
    }
}

/// One block of structured turn content, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text body.
        text: String,
    },
    /// Extended thinking emitted while the model reasons.
    Thinking {
        /// The thinking body.
        thinking: String,
    },
    /// A tool invocation requested by the model.
    ToolUse {
        /// Invocation id, echoed by the matching `tool_result` block.
        id: String,
        /// Tool name.
        name: String,
        /// Tool arguments.
        #[serde(default)]
        input: Value,
    },
    /// The outcome of an earlier tool invocation.
    ToolResult {
        /// Id of the `tool_use` block this result answers.
        tool_use_id: String,
        /// Result payload, plain text or nested blocks.
        #[serde(default)]
        content: Value,
        /// Whether the tool reported a failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// A block shape this crate does not model, preserved verbatim.
    #[serde(untagged)]
    Other(Value),
}

/// Terminal turn status frame (`type: "result"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMessage {
    /// `"success"` or an error subtype such as `"error_during_execution"`.
    #[serde(default)]
    pub subtype: Option<String>,
    /// Whether the turn ended in an error.
    #[serde(default)]
    pub is_error: bool,
    /// Wall-clock duration of the turn in milliseconds.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Model API time spent during the turn in milliseconds.
    #[serde(default)]
    pub duration_api_ms: Option<u64>,
    /// Number of conversational turns consumed.
    #[serde(default)]
    pub num_turns: Option<u32>,
    /// Session this result belongs to.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Total cost of the turn in USD, when the remote reports it.
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    /// Token usage for the turn.
    #[serde(default)]
    pub usage: Option<Value>,
    /// Tool calls denied during the turn.
    #[serde(default)]
    pub permission_denials: Vec<Value>,
    /// Frame uuid assigned by the remote agent.
    #[serde(default)]
    pub uuid: Option<String>,
    /// Fields this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Caller-supplied content for one outbound user turn.
#[derive(Debug, Clone)]
pub struct UserInput {
    /// Turn content.
    pub content: MessageContent,
    /// Tool invocation this turn answers, for nested agent turns.
    pub parent_tool_use_id: Option<String>,
}

impl UserInput {
    /// Build a plain-text turn.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: MessageContent::Text(content.into()),
            parent_tool_use_id: None,
        }
    }

    /// Build a turn from structured content blocks.
    #[must_use]
    pub fn blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            content: MessageContent::Blocks(blocks),
            parent_tool_use_id: None,
        }
    }

    /// Attach the id of the tool invocation this turn answers.
    #[must_use]
    pub fn with_parent_tool_use_id(mut self, id: impl Into<String>) -> Self {
        self.parent_tool_use_id = Some(id.into());
        self
    }
}

impl From<&str> for UserInput {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for UserInput {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}
