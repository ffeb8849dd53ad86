//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared SDK result type.
pub type Result<T> = std::result::Result<T, SdkError>;

/// SDK error enumeration covering all session failure modes.
///
/// Variants carry owned strings so the error is `Clone`: the stored
/// initialize outcome is observed by every waiter that touches the session
/// before the handshake finishes.
#[derive(Debug, Clone)]
pub enum SdkError {
    /// Session option validation failure at construction time.
    Config(String),
    /// Transport read or write failure.
    Transport(String),
    /// Malformed or unexpected frame on the control channel.
    Protocol(String),
    /// Remote agent answered a control request with an error outcome.
    Control(String),
    /// A bounded wait elapsed; the message names the concern that timed out.
    Timeout(String),
    /// The cancellation signal fired before the operation completed.
    Aborted,
    /// Operation attempted on a session that is already closed.
    Closed,
}

impl SdkError {
    /// Whether this error was caused by the session's cancellation signal,
    /// so callers can branch on intentional stop vs. failure.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl Display for SdkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Control(msg) => write!(f, "control request failed: {msg}"),
            Self::Timeout(msg) => write!(f, "timed out: {msg}"),
            Self::Aborted => write!(f, "aborted"),
            Self::Closed => write!(f, "session closed"),
        }
    }
}

impl std::error::Error for SdkError {}

impl From<std::io::Error> for SdkError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("invalid json: {err}"))
    }
}
