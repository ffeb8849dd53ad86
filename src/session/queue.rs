//! Ordered message queue between the routing loop and the session consumer.
//!
//! The producer half lives in the routing task; the consumer half lives in
//! the [`Session`](crate::Session) handle. Terminal state is carried out of
//! band so buffered messages always drain before an end or error is
//! reported, and so a close can finalize the queue even after the producer
//! task has exited.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::errors::{Result, SdkError};
use crate::protocol::Message;

/// Why no further messages will arrive.
#[derive(Debug, Clone)]
pub(crate) enum EndReason {
    /// The inbound stream ended cleanly.
    Done,
    /// The session's cancellation signal fired.
    Aborted,
    /// The inbound stream failed.
    Failed(SdkError),
}

/// Shared terminal-state slot. The first recorded reason wins.
pub(crate) type QueueState = Arc<Mutex<Option<EndReason>>>;

/// Create a bounded queue with its shared terminal-state handle.
pub(crate) fn message_queue(capacity: usize) -> (QueueSender, QueueReceiver, QueueState) {
    let (tx, rx) = mpsc::channel(capacity);
    let state: QueueState = Arc::new(Mutex::new(None));
    let sender = QueueSender {
        tx,
        state: Arc::clone(&state),
    };
    let receiver = QueueReceiver {
        rx,
        state: Arc::clone(&state),
        finished: false,
    };
    (sender, receiver, state)
}

/// Record `reason` as the terminal state unless one is already set.
pub(crate) async fn finish_queue(state: &QueueState, reason: EndReason) {
    let mut slot = state.lock().await;
    if slot.is_none() {
        *slot = Some(reason);
    }
}

/// Producer half, owned by the routing loop.
pub(crate) struct QueueSender {
    tx: mpsc::Sender<Message>,
    state: QueueState,
}

impl QueueSender {
    /// Enqueue one message, waiting for capacity.
    ///
    /// Returns `false` when `stop` fired first or the consumer is gone; the
    /// caller should stop routing either way.
    pub(crate) async fn push(&self, message: Message, stop: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = stop.cancelled() => false,
            sent = self.tx.send(message) => sent.is_ok(),
        }
    }

    /// Record the terminal state for the consumer.
    pub(crate) async fn finish(&self, reason: EndReason) {
        finish_queue(&self.state, reason).await;
    }
}

/// Consumer half, owned by the session handle.
pub(crate) struct QueueReceiver {
    rx: mpsc::Receiver<Message>,
    state: QueueState,
    finished: bool,
}

impl QueueReceiver {
    /// Next message in arrival order.
    ///
    /// Buffered messages drain before the terminal state is reported: a
    /// clean end yields `None`, an abort or failure yields one final `Err`,
    /// and everything after that is `None`.
    pub(crate) async fn next(&mut self) -> Option<Result<Message>> {
        if self.finished {
            return None;
        }
        if let Some(message) = self.rx.recv().await {
            return Some(Ok(message));
        }
        self.finished = true;
        let reason = self.state.lock().await.clone();
        match reason {
            None | Some(EndReason::Done) => None,
            Some(EndReason::Aborted) => Some(Err(SdkError::Aborted)),
            Some(EndReason::Failed(err)) => Some(Err(err)),
        }
    }
}
