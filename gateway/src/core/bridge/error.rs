//! Bridge error types.

use thiserror::Error;

use super::events::Side;
use super::session::SessionState;
use crate::core::codec::FormatError;

/// Whether an error costs a single frame or the whole call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The offending frame is dropped, logged and counted.
    Recoverable,
    /// The session moves to `Closing`.
    Fatal,
}

/// Error type for everything in the bridge core.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("audio format error: {0}")]
    Format(#[from] FormatError),

    #[error("{side} protocol error: {message}")]
    Protocol { side: Side, message: String },

    #[error("{0} connection closed")]
    ConnectionClosed(Side),

    /// The peer negotiated a stream the bridge cannot carry.
    #[error("{side} stream rejected: {message}")]
    StreamRejected { side: Side, message: String },

    #[error("{side} send failed: {message}")]
    Send { side: Side, message: String },

    #[error("AI provider unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("call {0} is already bridged")]
    DuplicateCall(String),

    #[error("session {0} is closed")]
    SessionClosed(String),

    #[error("no active call {0}")]
    UnknownCall(String),

    #[error("call capacity exceeded ({0} active)")]
    CapacityExceeded(usize),

    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

impl BridgeError {
    pub fn protocol(side: Side, message: impl Into<String>) -> Self {
        Self::Protocol {
            side,
            message: message.into(),
        }
    }

    pub fn stream_rejected(side: Side, message: impl Into<String>) -> Self {
        Self::StreamRejected {
            side,
            message: message.into(),
        }
    }

    pub fn send(side: Side, message: impl Into<String>) -> Self {
        Self::Send {
            side,
            message: message.into(),
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            Self::Format(_) | Self::Protocol { .. } => FailureClass::Recoverable,
            _ => FailureClass::Fatal,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.class() == FailureClass::Recoverable
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
