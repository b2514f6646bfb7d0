//! Backing stores for the vehicle ledger.
//!
//! [`LedgerStore::load`] returns every record in order and
//! [`LedgerStore::save`] replaces every record. Settlement writes go through
//! [`LedgerStore::update`], which touches one row and leaves rows the entry
//! side appended in the meantime alone. Lookups and updates happen in memory
//! in [`Ledger`](crate::Ledger).
//!
//! # Implementation Note
//!
//! The trait uses native async trait methods (edition 2024), so it is not
//! object-safe. [`AnyLedgerStore`] covers runtime backend selection.

#![allow(async_fn_in_trait)]

mod any;
mod csv_store;
mod memory_store;
mod sqlite_store;

pub use any::AnyLedgerStore;
pub use csv_store::CsvLedgerStore;
pub use memory_store::MemoryLedgerStore;
pub use sqlite_store::SqliteLedgerStore;

use crate::error::StorageResult;
use crate::models::VehicleRecord;

/// Ledger persistence contract.
pub trait LedgerStore: Send {
    /// Read every record, in stored order.
    async fn load(&self) -> StorageResult<Vec<VehicleRecord>>;

    /// Replace the stored ledger with `records`.
    ///
    /// Either every record is written or the previous contents remain.
    async fn save(&mut self, records: &[VehicleRecord]) -> StorageResult<()>;

    /// Write the settlement fields (exit time, fee, status) of `record` to
    /// the row at position `row`, in stored order. Other rows, and the plate
    /// and entry time of this one, are left as stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` without writing anything if the
    /// stored row no longer equals `previous`.
    async fn update(
        &mut self,
        row: usize,
        previous: &VehicleRecord,
        record: &VehicleRecord,
    ) -> StorageResult<()>;

    /// Where the records live, for logs.
    fn location(&self) -> String;
}
