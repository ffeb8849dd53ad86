//! Servicing of inbound control requests.
//!
//! Two subtypes are answered: `can_use_tool` runs the host's permission
//! callback under a timeout and fails toward denial, `mcp_message` forwards
//! a JSON-RPC frame to an in-process tool server and relays the reply.
//! Every request gets exactly one response frame, success or error.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::debug;

use super::pending::message_key;
use super::SessionInner;
use crate::errors::{Result, SdkError};
use crate::protocol::control::{error_frame, success_frame, InboundControlRequest};
use crate::protocol::permission::{PermissionRequest, PermissionResult};

/// Answer one inbound control request.
pub(super) async fn service_control_request(inner: Arc<SessionInner>, request: InboundControlRequest) {
    let subtype = request
        .request
        .get("subtype")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    debug!(
        request_id = request.request_id.as_str(),
        subtype = subtype.as_str(),
        "servicing control request"
    );
    let outcome = match subtype.as_str() {
        "can_use_tool" => handle_can_use_tool(&inner, request.request).await,
        "mcp_message" => handle_mcp_message(&inner, request.request).await,
        other => Err(SdkError::Protocol(format!(
            "unsupported control request subtype: {other}"
        ))),
    };
    let frame = match outcome {
        Ok(payload) => success_frame(&request.request_id, payload),
        Err(err) => error_frame(&request.request_id, &err.to_string()),
    };
    if let Err(err) = inner.write_frame(&frame).await {
        debug!(
            request_id = request.request_id.as_str(),
            error = %err,
            "failed to write control response"
        );
    }
}

/// Run the permission callback for a tool-use request.
///
/// Absent callback, callback failure, and callback timeout all resolve to a
/// denial rather than an error frame, so the remote agent always receives a
/// usable permission decision.
async fn handle_can_use_tool(inner: &SessionInner, request: Value) -> Result<Value> {
    let request: PermissionRequest = serde_json::from_value(request)?;
    let tool_name = request.tool_name.clone();
    let decision = match inner.can_use_tool.clone() {
        None => PermissionResult::deny("no permission callback configured"),
        Some(callback) => {
            let timeout = inner.timeouts.can_use_tool;
            tokio::select! {
                biased;
                () = inner.abort.cancelled() => PermissionResult::deny("session aborted"),
                outcome = callback(request) => match outcome {
                    Ok(decision) => decision,
                    Err(err) => PermissionResult::deny(format!("permission callback failed: {err}")),
                },
                () = sleep(timeout) => PermissionResult::deny(format!(
                    "permission callback timed out after {}s",
                    timeout.as_secs()
                )),
            }
        }
    };
    if matches!(decision, PermissionResult::Deny { .. }) {
        debug!(tool_name = tool_name.as_str(), "denying tool use");
    }
    Ok(serde_json::to_value(decision)?)
}

/// Forward an MCP frame to the named in-process server.
///
/// Requests (frames with a method and a non-null id) wait for the matching
/// server response under a timeout; notifications are forwarded without
/// waiting and acknowledged with a null reply.
async fn handle_mcp_message(inner: &SessionInner, request: Value) -> Result<Value> {
    let server_name = request
        .get("server_name")
        .and_then(Value::as_str)
        .ok_or_else(|| SdkError::Protocol("mcp_message missing server_name".into()))?
        .to_owned();
    let message = request
        .get("message")
        .cloned()
        .ok_or_else(|| SdkError::Protocol("mcp_message missing message".into()))?;
    let Some(to_server) = inner.server_sender(&server_name).await else {
        return Err(SdkError::Protocol(format!(
            "no sdk mcp server named '{server_name}'"
        )));
    };

    let is_request = message.get("method").is_some();
    let key = message
        .get("id")
        .filter(|id| !id.is_null())
        .map(message_key);
    let (Some(key), true) = (key, is_request) else {
        // Notification or response passthrough: forward and acknowledge.
        if to_server.send(message).await.is_err() {
            return Err(SdkError::Transport(format!(
                "sdk mcp server '{server_name}' is gone"
            )));
        }
        return Ok(json!({ "mcp_response": Value::Null }));
    };

    let waiter = inner.cross_calls.register(&server_name, &key).await;
    if to_server.send(message).await.is_err() {
        inner.cross_calls.remove(&server_name, &key).await;
        return Err(SdkError::Transport(format!(
            "sdk mcp server '{server_name}' is gone"
        )));
    }
    let timeout = inner.timeouts.mcp_request;
    tokio::select! {
        biased;
        () = inner.abort.cancelled() => {
            inner.cross_calls.remove(&server_name, &key).await;
            Err(SdkError::Aborted)
        }
        reply = waiter => match reply {
            Ok(frame) => Ok(json!({ "mcp_response": frame })),
            Err(_) => Err(SdkError::Closed),
        },
        () = sleep(timeout) => {
            inner.cross_calls.remove(&server_name, &key).await;
            Err(SdkError::Timeout(format!(
                "sdk mcp server '{server_name}' did not answer within {}s",
                timeout.as_secs()
            )))
        }
    }
}
