use super::LedgerStore;
use crate::error::{StorageError, StorageResult};
use crate::models::VehicleRecord;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<VehicleRecord>,
    writes: usize,
    fail_writes: bool,
}

impl MemoryState {
    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes {
            return Err(StorageError::Io(io::Error::other("memory store rejects writes")));
        }
        Ok(())
    }
}

/// In-memory ledger store for tests and development.
///
/// Clones share the same contents, so a test can keep one clone to inspect
/// or modify what the ledger under test has saved.
///
/// # Examples
///
/// ```
/// use parkgate_storage::{Ledger, MemoryLedgerStore};
///
/// # #[tokio::main]
/// # async fn main() -> parkgate_storage::StorageResult<()> {
/// let store = MemoryLedgerStore::new();
/// let mut ledger = Ledger::open(store.clone()).await?;
///
/// // Nothing changed, nothing written.
/// ledger.persist().await?;
/// assert_eq!(store.write_count(), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLedgerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `records`.
    pub fn with_records(records: Vec<VehicleRecord>) -> Self {
        let store = Self::new();
        store.state().records = records;
        store
    }

    /// Current stored records.
    pub fn records(&self) -> Vec<VehicleRecord> {
        self.state().records.clone()
    }

    /// Append a record, as the entry side would.
    pub fn push(&self, record: VehicleRecord) {
        self.state().records.push(record);
    }

    /// Replace the record at `index`, as another writer would.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn overwrite(&self, index: usize, record: VehicleRecord) {
        self.state().records[index] = record;
    }

    /// Number of successful saves and updates.
    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    /// Make subsequent saves and updates fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LedgerStore for MemoryLedgerStore {
    async fn load(&self) -> StorageResult<Vec<VehicleRecord>> {
        Ok(self.records())
    }

    async fn save(&mut self, records: &[VehicleRecord]) -> StorageResult<()> {
        let mut state = self.state();
        state.check_writable()?;

        state.records = records.to_vec();
        state.writes += 1;
        Ok(())
    }

    async fn update(
        &mut self,
        row: usize,
        previous: &VehicleRecord,
        record: &VehicleRecord,
    ) -> StorageResult<()> {
        let mut state = self.state();
        state.check_writable()?;

        let stored = match state.records.get_mut(row) {
            Some(stored) if *stored == *previous => stored,
            _ => {
                return Err(StorageError::Conflict {
                    plate: previous.plate.to_string(),
                });
            }
        };

        stored.exit_time = record.exit_time;
        stored.due_amount = record.due_amount;
        stored.payment_status = record.payment_status;
        state.writes += 1;
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
