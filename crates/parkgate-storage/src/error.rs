use thiserror::Error;

/// Storage-specific error types for the vehicle ledger.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Exit data cannot be changed once the visit is settled
    #[error("Record for plate {plate} is already paid")]
    AlreadyPaid { plate: String },

    /// Handle does not refer to a record of the current ledger contents
    #[error("Invalid record handle")]
    InvalidHandle,

    /// Stored row no longer holds what was loaded
    #[error("Ledger row for plate {plate} changed since it was loaded")]
    Conflict { plate: String },

    /// Stored data cannot be turned into a vehicle record
    #[error("Corrupt ledger row {row}: {reason}")]
    Corrupt { row: usize, reason: String },

    /// CSV reading or writing failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    pub(crate) fn corrupt(row: usize, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            row,
            reason: reason.into(),
        }
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
