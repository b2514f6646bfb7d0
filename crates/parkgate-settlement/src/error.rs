use crate::state::SettlementState;
use parkgate_link::LinkError;
use parkgate_storage::StorageError;
use thiserror::Error;

/// Failures that end a settlement session abnormally.
///
/// Device-side problems (timeouts, malformed payloads, declined payments)
/// are outcomes, not errors; only these propagate.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The ledger could not be read or written. `STATUS:FAILED` was sent.
    #[error("Ledger persistence failed: {0}")]
    Persistence(#[from] StorageError),

    /// The device link failed or closed.
    #[error("Link failure: {0}")]
    Link(#[from] LinkError),

    /// Internal sequencing error.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: SettlementState,
        to: SettlementState,
    },
}
