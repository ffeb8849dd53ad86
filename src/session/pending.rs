//! Correlation tables for in-flight request/response pairs.
//!
//! [`PendingControls`] tracks outbound control requests by request id.
//! [`CrossCalls`] tracks embedded-server round trips by server name and
//! JSON-RPC message id.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

use crate::errors::{Result, SdkError};

/// Canonical map key for a JSON-RPC message id of any JSON type.
pub(crate) fn message_key(id: &Value) -> String {
    id.to_string()
}

/// Waiters for outbound control requests, keyed by request id.
#[derive(Default)]
pub(crate) struct PendingControls {
    entries: Mutex<HashMap<String, oneshot::Sender<Result<Value>>>>,
}

impl PendingControls {
    /// Register a waiter for `request_id`. Call before writing the frame so
    /// a fast response cannot race the registration.
    pub(crate) async fn register(&self, request_id: &str) -> oneshot::Receiver<Result<Value>> {
        let (tx, rx) = oneshot::channel();
        self.entries.lock().await.insert(request_id.to_owned(), tx);
        rx
    }

    /// Resolve the waiter for `request_id` with `outcome`.
    ///
    /// Returns `false` when no waiter exists, which means the request
    /// already completed, timed out, or was never issued by this session.
    pub(crate) async fn resolve(&self, request_id: &str, outcome: Result<Value>) -> bool {
        let Some(waiter) = self.entries.lock().await.remove(request_id) else {
            return false;
        };
        waiter.send(outcome).ok();
        true
    }

    /// Drop the waiter for `request_id` without resolving it.
    pub(crate) async fn remove(&self, request_id: &str) {
        self.entries.lock().await.remove(request_id);
    }

    /// Reject every outstanding waiter with a copy of `err`.
    pub(crate) async fn fail_all(&self, err: &SdkError) {
        let drained: Vec<_> = self.entries.lock().await.drain().collect();
        for (_, waiter) in drained {
            waiter.send(Err(err.clone())).ok();
        }
    }
}

/// Waiters for embedded-server responses, keyed by server and message id.
#[derive(Default)]
pub(crate) struct CrossCalls {
    entries: Mutex<HashMap<(String, String), oneshot::Sender<Value>>>,
}

impl CrossCalls {
    /// Register a waiter for the given server and message id.
    pub(crate) async fn register(&self, server: &str, message_id: &str) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.entries
            .lock()
            .await
            .insert((server.to_owned(), message_id.to_owned()), tx);
        rx
    }

    /// Deliver a server frame to its waiter. Returns `false` when no waiter
    /// exists for the pair.
    pub(crate) async fn resolve(&self, server: &str, message_id: &str, frame: Value) -> bool {
        let key = (server.to_owned(), message_id.to_owned());
        let Some(waiter) = self.entries.lock().await.remove(&key) else {
            return false;
        };
        waiter.send(frame).ok();
        true
    }

    /// Drop the waiter for the given pair without resolving it.
    pub(crate) async fn remove(&self, server: &str, message_id: &str) {
        let key = (server.to_owned(), message_id.to_owned());
        self.entries.lock().await.remove(&key);
    }

    /// Drop every outstanding waiter; their receivers observe closure.
    pub(crate) async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}
