//! Duplex framed-message channel to a remote agent.
//!
//! The [`Transport`] trait decouples the session orchestrator from the
//! plumbing that moves newline-delimited JSON frames: a spawned child
//! process over stdio ([`process::ProcessTransport`]), or an in-memory
//! double in tests. Implementations own their read loop and hand parsed
//! frames to the orchestrator through a channel.

pub mod codec;
pub mod process;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::errors::Result;

/// Duplex channel carrying framed JSON messages to and from a remote agent.
///
/// Frames are complete JSON documents without the trailing newline; framing
/// is the implementation's concern.
pub trait Transport: Send + Sync {
    /// Write one framed message to the remote side.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Transport`](crate::SdkError::Transport) if the
    /// channel's input side is closed or the write fails.
    fn write(&self, frame: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Take ownership of the inbound frame receiver.
    ///
    /// Frames arrive parsed, in arrival order. An `Err` item reports a fatal
    /// read failure and is the last item; channel close without an error is
    /// clean end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Transport`](crate::SdkError::Transport) on the
    /// second and subsequent calls: the receiver can be taken exactly once.
    fn take_messages(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<Result<Value>>>> + Send + '_>>;

    /// Signal that no further input frames will be written.
    ///
    /// Idempotent: signalling an already-ended input side is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Transport`](crate::SdkError::Transport) if the
    /// signal cannot be delivered.
    fn end_input(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Close the channel and release its resources.
    ///
    /// Idempotent: closing an already-closed channel is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Transport`](crate::SdkError::Transport) if
    /// teardown fails; the channel is unusable either way.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
