//! Error types for link operations.

use parkgate_protocol::ProtocolError;
use std::time::Duration;

/// Result type alias for link operations.
pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// Errors that can occur while talking to the gate device.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// No (matching) line arrived before the deadline.
    #[error("No line received within {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    /// The device side of the link is gone.
    #[error("Link closed")]
    Closed,

    /// Serial port could not be opened or configured.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Outbound line rejected by the codec.
    #[error("Protocol error: {0}")]
    Protocol(ProtocolError),

    /// Transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Create a timeout error for the given wait.
    pub fn timeout(waited: Duration) -> Self {
        Self::Timeout {
            waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns `true` for a deadline expiry, which callers recover from.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<ProtocolError> for LinkError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(io) => Self::Io(io),
            other => Self::Protocol(other),
        }
    }
}
