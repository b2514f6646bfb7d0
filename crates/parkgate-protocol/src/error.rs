use crate::message::MessageKind;
use thiserror::Error;

/// Errors raised while parsing or framing protocol lines.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Line does not start with any known prefix
    #[error("Unknown message: {0:?}")]
    UnknownMessage(String),

    /// Known prefix with a payload that cannot be parsed
    #[error("Malformed {kind} message: {reason}")]
    MalformedMessage { kind: MessageKind, reason: String },

    /// Outbound text that cannot be sent as a single line
    #[error("Invalid outbound line: {0}")]
    InvalidLine(String),

    /// Low-level I/O error from the framed transport
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn malformed(kind: MessageKind, reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            kind,
            reason: reason.into(),
        }
    }
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
