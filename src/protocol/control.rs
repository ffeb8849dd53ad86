//! Control-channel envelopes and handshake payloads.
//!
//! Control frames ride the same stream as conversation messages but are
//! routed out-of-band and never reach the session consumer.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Inbound `control_request` envelope addressed to this client.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundControlRequest {
    /// Correlation id chosen by the remote agent.
    pub request_id: String,
    /// Subtype-specific request body.
    pub request: Value,
}

/// Inbound `control_response` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlResponseEnvelope {
    /// Response body.
    pub response: ControlResponseBody,
}

/// Body of a `control_response` frame: the outcome for one request id.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlResponseBody {
    /// `"success"` or `"error"`; absent means success.
    #[serde(default = "default_subtype")]
    pub subtype: String,
    /// Correlation id of the request this answers.
    pub request_id: String,
    /// Success payload, when present.
    #[serde(default)]
    pub response: Option<Value>,
    /// Error description, when `subtype` is `"error"`.
    #[serde(default)]
    pub error: Option<Value>,
}

fn default_subtype() -> String {
    "success".to_owned()
}

impl ControlResponseBody {
    /// Render the error description as display text.
    #[must_use]
    pub fn error_text(&self) -> String {
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unspecified error".to_owned(),
        }
    }
}

/// Build an outbound `control_request` frame.
#[must_use]
pub fn request_frame(request_id: &str, request: Value) -> Value {
    json!({
        "type": "control_request",
        "request_id": request_id,
        "request": request,
    })
}

/// Build a success `control_response` frame for a serviced inbound request.
#[must_use]
pub fn success_frame(request_id: &str, payload: Value) -> Value {
    json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": payload,
        },
    })
}

/// Build an error `control_response` frame for a serviced inbound request.
#[must_use]
pub fn error_frame(request_id: &str, message: &str) -> Value {
    json!({
        "type": "control_response",
        "response": {
            "subtype": "error",
            "request_id": request_id,
            "error": message,
        },
    })
}

/// Client capability flags advertised during the initialize handshake.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Capabilities {
    /// Whether this client services `can_use_tool` permission checks.
    pub can_handle_can_use_tool: bool,
    /// Whether this client services hook callbacks.
    pub can_handle_hook_callback: bool,
    /// Whether this client bridges `mcp_message` frames to in-process servers.
    pub can_handle_mcp_message: bool,
    /// Whether this client may change the permission mode mid-session.
    pub can_set_permission_mode: bool,
    /// Whether this client may change the model mid-session.
    pub can_set_model: bool,
}

/// Parsed payload of a successful `initialize` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Slash commands the remote agent accepts.
    #[serde(default)]
    pub commands: Vec<SlashCommand>,
    /// Active output style, when the remote agent reports one.
    #[serde(default)]
    pub output_style: Option<String>,
    /// Fields this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One slash command advertised by the remote agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlashCommand {
    /// Command name without the leading slash.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Hint describing the expected argument shape.
    #[serde(default, alias = "argumentHint")]
    pub argument_hint: Option<String>,
    /// Fields this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
