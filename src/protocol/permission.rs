//! Permission mediation vocabulary for `can_use_tool` exchanges.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Permission posture requested of the remote agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionMode {
    /// Prompt for every consequential tool call.
    Default,
    /// Read-only planning; no mutations are executed.
    Plan,
    /// File edits apply without prompting; other tools still prompt.
    AutoEdit,
    /// Every tool call is pre-approved.
    Yolo,
}

impl PermissionMode {
    /// Wire string for this mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Plan => "plan",
            Self::AutoEdit => "auto-edit",
            Self::Yolo => "yolo",
        }
    }
}

impl Display for PermissionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound `can_use_tool` request awaiting a host decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRequest {
    /// Tool the remote agent wants to invoke.
    pub tool_name: String,
    /// Proposed tool input.
    #[serde(default)]
    pub input: Value,
    /// Id of the originating `tool_use` block, when known.
    #[serde(default)]
    pub tool_use_id: Option<String>,
    /// Permission updates the remote agent suggests the host adopt.
    #[serde(default)]
    pub permission_suggestions: Option<Value>,
    /// Path that tripped a permission rule, when one did.
    #[serde(default)]
    pub blocked_path: Option<String>,
    /// Fields this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Host decision for one `can_use_tool` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "behavior", rename_all = "lowercase")]
pub enum PermissionResult {
    /// Let the tool call proceed.
    Allow {
        /// Replacement input, when the host rewrote it.
        #[serde(rename = "updatedInput", default, skip_serializing_if = "Option::is_none")]
        updated_input: Option<Value>,
    },
    /// Refuse the tool call.
    Deny {
        /// Reason surfaced to the remote agent.
        message: String,
        /// Whether the remote agent should also interrupt the turn.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interrupt: Option<bool>,
    },
}

impl PermissionResult {
    /// Allow the call with its input unchanged.
    #[must_use]
    pub fn allow() -> Self {
        Self::Allow {
            updated_input: None,
        }
    }

    /// Allow the call with rewritten input.
    #[must_use]
    pub fn allow_with_input(input: Value) -> Self {
        Self::Allow {
            updated_input: Some(input),
        }
    }

    /// Deny the call with a reason.
    #[must_use]
    pub fn deny(message: impl Into<String>) -> Self {
        Self::Deny {
            message: message.into(),
            interrupt: None,
        }
    }

    /// Deny the call and ask the remote agent to interrupt the turn.
    #[must_use]
    pub fn deny_and_interrupt(message: impl Into<String>) -> Self {
        Self::Deny {
            message: message.into(),
            interrupt: Some(true),
        }
    }
}

impl From<bool> for PermissionResult {
    fn from(allowed: bool) -> Self {
        if allowed {
            Self::allow()
        } else {
            Self::deny("Tool use denied")
        }
    }
}
