//! Storage layer for the parking ledger.
//!
//! The ledger is a list of vehicle visits: plate, entry time, and, once the
//! vehicle leaves, exit time, fee and payment status. The entry side appends
//! rows; settlement updates them.
//!
//! # Architecture
//!
//! - [`Ledger`] - in-memory records with a handle-based update API
//! - [`LedgerStore`] - load, save and row update contract
//! - [`CsvLedgerStore`] - CSV file with a header row (default)
//! - [`SqliteLedgerStore`] - `vehicles` table in a SQLite database
//! - [`MemoryLedgerStore`] - shared in-memory store for tests
//! - [`AnyLedgerStore`] - runtime backend selection
//!
//! # Examples
//!
//! ```no_run
//! use parkgate_core::{LedgerTimestamp, Plate};
//! use parkgate_storage::{CsvLedgerStore, Ledger};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = CsvLedgerStore::open("plates_log.csv").await?;
//! let mut ledger = Ledger::open(store).await?;
//!
//! if let Some(handle) = ledger.find_by_plate(&Plate::new("RAB123A")?) {
//!     ledger.mark_exit(handle, LedgerTimestamp::now(), 400)?;
//!     ledger.persist().await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Durability
//!
//! A persist writes only the rows settlement changed, and only if each
//! stored row still holds what was loaded. The CSV store re-reads the file,
//! writes a temporary copy with the one row changed and renames it into
//! place; the SQLite store updates the row by `id`. Either way rows appended
//! by the entry side are kept and a failed write leaves the previous ledger
//! intact.

pub mod connection;
pub mod error;
pub mod ledger;
pub mod models;
pub mod stores;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use ledger::{Ledger, RecordHandle};
pub use models::VehicleRecord;
pub use stores::{
    AnyLedgerStore, CsvLedgerStore, LedgerStore, MemoryLedgerStore, SqliteLedgerStore,
};
