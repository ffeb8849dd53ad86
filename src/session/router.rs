//! Background routing loop.
//!
//! One task per session reads every inbound frame and dispatches it:
//! control traffic is handled or correlated here, conversation messages go
//! to the ordered queue. Handlers that can block, like permission
//! callbacks, run on their own tasks so routing never stalls behind them.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::control;
use super::queue::{EndReason, QueueSender};
use super::SessionInner;
use crate::errors::{Result, SdkError};
use crate::protocol::control::{ControlResponseEnvelope, InboundControlRequest};
use crate::protocol::Message;

/// Drive the routing loop until the stream ends or shutdown fires.
pub(super) async fn run_router(
    inner: Arc<SessionInner>,
    mut inbound: mpsc::Receiver<Result<Value>>,
    queue: QueueSender,
) {
    loop {
        let item = tokio::select! {
            biased;
            () = inner.shutdown.cancelled() => break,
            item = inbound.recv() => item,
        };
        match item {
            None => {
                queue.finish(end_reason(&inner, None)).await;
                break;
            }
            Some(Err(err)) => {
                queue.finish(end_reason(&inner, Some(err))).await;
                break;
            }
            Some(Ok(frame)) => {
                if !route_frame(&inner, &queue, frame).await {
                    break;
                }
            }
        }
    }
    debug!(session_id = inner.session_id.as_str(), "routing loop stopped");
}

/// Terminal reason for the queue when the inbound stream stops.
fn end_reason(inner: &SessionInner, err: Option<SdkError>) -> EndReason {
    if inner.abort.is_cancelled() {
        EndReason::Aborted
    } else {
        match err {
            Some(err) => EndReason::Failed(err),
            None => EndReason::Done,
        }
    }
}

/// Dispatch one frame. Returns `false` when routing should stop.
async fn route_frame(inner: &Arc<SessionInner>, queue: &QueueSender, frame: Value) -> bool {
    let kind = frame
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    match kind.as_str() {
        "control_request" => {
            dispatch_control_request(inner, frame);
            true
        }
        "control_response" => {
            resolve_control_response(inner, frame).await;
            true
        }
        "control_cancel_request" => {
            cancel_control_request(inner, &frame).await;
            true
        }
        "result" => {
            inner.note_result();
            if inner.single_turn {
                // Single-turn sessions stop accepting input after the first
                // result so the remote agent can finish and exit.
                let transport = Arc::clone(&inner.transport);
                tokio::spawn(async move {
                    if let Err(err) = transport.end_input().await {
                        debug!(error = %err, "end_input after result failed");
                    }
                });
            }
            queue.push(Message::from_value(frame), &inner.shutdown).await
        }
        "system" | "user" | "assistant" => {
            queue.push(Message::from_value(frame), &inner.shutdown).await
        }
        other => {
            warn!(message_type = other, "unrecognized message type, passing through");
            queue.push(Message::from_value(frame), &inner.shutdown).await
        }
    }
}

/// Hand an inbound control request to its own servicing task.
fn dispatch_control_request(inner: &Arc<SessionInner>, frame: Value) {
    match serde_json::from_value::<InboundControlRequest>(frame) {
        Ok(request) => {
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                control::service_control_request(inner, request).await;
            });
        }
        Err(err) => {
            warn!(error = %err, "control_request frame missing envelope fields, dropping");
        }
    }
}

/// Resolve the pending entry a control response answers.
async fn resolve_control_response(inner: &Arc<SessionInner>, frame: Value) {
    let envelope: ControlResponseEnvelope = match serde_json::from_value(frame) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(error = %err, "malformed control_response, dropping");
            return;
        }
    };
    let body = envelope.response;
    let outcome = if body.subtype == "error" {
        Err(SdkError::Control(body.error_text()))
    } else {
        Ok(body.response.unwrap_or(Value::Null))
    };
    if !inner.pending.resolve(&body.request_id, outcome).await {
        debug!(
            request_id = body.request_id.as_str(),
            "control response for unknown request id, dropping"
        );
    }
}

/// Reject the pending entry a cancel frame names.
async fn cancel_control_request(inner: &Arc<SessionInner>, frame: &Value) {
    let Some(request_id) = frame.get("request_id").and_then(Value::as_str) else {
        warn!("control_cancel_request missing request_id, dropping");
        return;
    };
    if inner.pending.resolve(request_id, Err(SdkError::Aborted)).await {
        debug!(request_id, "pending control request cancelled by peer");
    } else {
        debug!(request_id, "cancel for unknown request id, ignoring");
    }
}
