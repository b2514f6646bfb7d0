//! In-memory view of the vehicle ledger over a [`LedgerStore`].
//!
//! Lookups and updates work on the loaded records. [`Ledger::persist`]
//! writes back only the records changed since the last load or persist, one
//! row at a time, so rows the entry side appended meanwhile are kept. If a
//! write fails, the in-memory records return to what the store holds, so
//! memory never claims more than the store.

use crate::error::{StorageError, StorageResult};
use crate::models::VehicleRecord;
use crate::stores::LedgerStore;
use parkgate_core::{Amount, LedgerTimestamp, PaymentStatus, Plate};
use tracing::{debug, error};

/// Position of a record in the ledger contents it was found in.
///
/// A handle is only valid until the ledger is reloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHandle {
    index: usize,
    generation: u64,
}

/// Vehicle ledger.
#[derive(Debug)]
pub struct Ledger<S> {
    store: S,
    records: Vec<VehicleRecord>,
    /// Contents the store is known to hold
    persisted: Vec<VehicleRecord>,
    /// Bumped on every reload; invalidates older handles
    generation: u64,
}

impl<S: LedgerStore> Ledger<S> {
    /// Load the ledger from `store`.
    pub async fn open(store: S) -> StorageResult<Self> {
        let records = store.load().await?;
        debug!(location = %store.location(), count = records.len(), "Ledger opened");

        Ok(Self {
            store,
            persisted: records.clone(),
            records,
            generation: 0,
        })
    }

    /// Replace the in-memory records with the store's current contents.
    ///
    /// Picks up rows added by the entry side since the last load.
    /// Outstanding handles become invalid.
    pub async fn reload(&mut self) -> StorageResult<()> {
        let records = self.store.load().await?;
        self.persisted = records.clone();
        self.records = records;
        self.generation += 1;
        Ok(())
    }

    /// First record whose plate matches exactly.
    pub fn find_by_plate(&self, plate: &Plate) -> Option<RecordHandle> {
        self.records
            .iter()
            .position(|record| record.plate == *plate)
            .map(|index| RecordHandle {
                index,
                generation: self.generation,
            })
    }

    /// Record behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidHandle` for a handle from before the
    /// last reload.
    pub fn record(&self, handle: RecordHandle) -> StorageResult<&VehicleRecord> {
        self.check(handle)?;
        Ok(&self.records[handle.index])
    }

    /// Set the exit time and fee of an unpaid record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyPaid` if the record is settled.
    pub fn mark_exit(
        &mut self,
        handle: RecordHandle,
        exit_time: LedgerTimestamp,
        due_amount: Amount,
    ) -> StorageResult<()> {
        self.check(handle)?;
        let record = &mut self.records[handle.index];

        if record.is_paid() {
            return Err(StorageError::AlreadyPaid {
                plate: record.plate.to_string(),
            });
        }

        record.exit_time = Some(exit_time);
        record.due_amount = Some(due_amount);
        Ok(())
    }

    /// Mark a record as paid. Marking a paid record again changes nothing.
    pub fn mark_paid(&mut self, handle: RecordHandle) -> StorageResult<()> {
        self.check(handle)?;
        self.records[handle.index].payment_status = PaymentStatus::Paid;
        Ok(())
    }

    /// Write changed records to the store.
    ///
    /// # Errors
    ///
    /// Returns the store's error, including `StorageError::Conflict` when a
    /// stored row no longer matches what was loaded. The in-memory records
    /// are then rolled back to the persisted contents.
    pub async fn persist(&mut self) -> StorageResult<()> {
        let mut written = 0;

        for index in 0..self.records.len() {
            if self.records[index] == self.persisted[index] {
                continue;
            }

            let result = self
                .store
                .update(index, &self.persisted[index], &self.records[index])
                .await;

            if let Err(e) = result {
                error!(
                    location = %self.store.location(),
                    error = %e,
                    "Ledger persist failed, rolling back in-memory changes"
                );
                self.records.clone_from(&self.persisted);
                return Err(e);
            }

            self.persisted[index] = self.records[index].clone();
            written += 1;
        }

        debug!(written, "Ledger persisted");
        Ok(())
    }

    /// All records, in ledger order.
    pub fn records(&self) -> &[VehicleRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the ledger has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn check(&self, handle: RecordHandle) -> StorageResult<()> {
        if handle.generation != self.generation || handle.index >= self.records.len() {
            return Err(StorageError::InvalidHandle);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryLedgerStore;
    use rstest::rstest;

    fn record(plate: &str) -> VehicleRecord {
        VehicleRecord::new(
            Plate::new(plate).unwrap(),
            LedgerTimestamp::parse("2024-01-01 10:00:00").unwrap(),
        )
    }

    fn exit_time() -> LedgerTimestamp {
        LedgerTimestamp::parse("2024-01-01 12:00:00").unwrap()
    }

    async fn ledger_with(records: Vec<VehicleRecord>) -> (Ledger<MemoryLedgerStore>, MemoryLedgerStore) {
        let store = MemoryLedgerStore::with_records(records);
        (Ledger::open(store.clone()).await.unwrap(), store)
    }

    #[rstest]
    #[case("RAB123A", Some(0))]
    #[case("RAC456B", Some(1))]
    #[case("rab123a", None)]
    #[case("UNKNOWN", None)]
    #[tokio::test]
    async fn test_find_by_plate_is_exact(#[case] plate: &str, #[case] expected: Option<usize>) {
        let (ledger, _) = ledger_with(vec![record("RAB123A"), record("RAC456B")]).await;

        let found = ledger.find_by_plate(&Plate::new(plate).unwrap());
        assert_eq!(found.map(|h| h.index), expected);
    }

    #[tokio::test]
    async fn test_duplicate_plate_first_match_wins() {
        let mut second = record("RAB123A");
        second.due_amount = Some(999);
        let (ledger, _) = ledger_with(vec![record("RAB123A"), second]).await;

        let handle = ledger.find_by_plate(&Plate::new("RAB123A").unwrap()).unwrap();
        assert_eq!(ledger.record(handle).unwrap().due_amount, None);
    }

    #[tokio::test]
    async fn test_mark_exit_rejects_paid_record() {
        let mut paid = record("RAB123A");
        paid.payment_status = PaymentStatus::Paid;
        let (mut ledger, _) = ledger_with(vec![paid]).await;
        let handle = ledger.find_by_plate(&Plate::new("RAB123A").unwrap()).unwrap();

        let result = ledger.mark_exit(handle, exit_time(), 400);

        assert!(matches!(result, Err(StorageError::AlreadyPaid { .. })));
        assert_eq!(ledger.record(handle).unwrap().due_amount, None);
    }

    #[tokio::test]
    async fn test_mark_paid_is_idempotent() {
        let (mut ledger, _) = ledger_with(vec![record("RAB123A")]).await;
        let handle = ledger.find_by_plate(&Plate::new("RAB123A").unwrap()).unwrap();

        ledger.mark_paid(handle).unwrap();
        ledger.mark_paid(handle).unwrap();

        assert!(ledger.record(handle).unwrap().is_paid());
    }

    #[tokio::test]
    async fn test_persist_writes_changed_records() {
        let (mut ledger, store) = ledger_with(vec![record("RAB123A"), record("RAC456B")]).await;
        let handle = ledger.find_by_plate(&Plate::new("RAC456B").unwrap()).unwrap();

        ledger.mark_exit(handle, exit_time(), 400).unwrap();
        ledger.persist().await.unwrap();

        let saved = store.records();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].due_amount, Some(400));
        assert_eq!(saved[1].exit_time, Some(exit_time()));
        assert_eq!(store.write_count(), 1);

        ledger.persist().await.unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_persist_keeps_rows_appended_since_load() {
        let (mut ledger, store) = ledger_with(vec![record("RAB123A")]).await;
        let handle = ledger.find_by_plate(&Plate::new("RAB123A").unwrap()).unwrap();
        ledger.mark_exit(handle, exit_time(), 400).unwrap();

        store.push(record("RAC999Z"));
        ledger.mark_paid(handle).unwrap();
        ledger.persist().await.unwrap();

        let saved = store.records();
        assert_eq!(saved.len(), 2);
        assert!(saved[0].is_paid());
        assert_eq!(saved[1], record("RAC999Z"));
    }

    #[tokio::test]
    async fn test_persist_conflict_rolls_back() {
        let (mut ledger, store) = ledger_with(vec![record("RAB123A")]).await;
        let handle = ledger.find_by_plate(&Plate::new("RAB123A").unwrap()).unwrap();

        let mut settled_elsewhere = record("RAB123A");
        settled_elsewhere.payment_status = PaymentStatus::Paid;
        store.overwrite(0, settled_elsewhere.clone());

        ledger.mark_exit(handle, exit_time(), 400).unwrap();
        let result = ledger.persist().await;

        assert!(matches!(result, Err(StorageError::Conflict { .. })));
        assert_eq!(ledger.record(handle).unwrap(), &record("RAB123A"));
        assert_eq!(store.records(), vec![settled_elsewhere]);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back() {
        let (mut ledger, store) = ledger_with(vec![record("RAB123A")]).await;
        let handle = ledger.find_by_plate(&Plate::new("RAB123A").unwrap()).unwrap();

        ledger.mark_exit(handle, exit_time(), 400).unwrap();
        ledger.persist().await.unwrap();

        store.set_fail_writes(true);
        ledger.mark_paid(handle).unwrap();
        assert!(ledger.persist().await.is_err());

        let current = ledger.record(handle).unwrap();
        assert!(!current.is_paid());
        assert_eq!(current.due_amount, Some(400));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_reload_sees_new_rows_and_invalidates_handles() {
        let (mut ledger, store) = ledger_with(vec![record("RAB123A")]).await;
        let stale = ledger.find_by_plate(&Plate::new("RAB123A").unwrap()).unwrap();

        store.push(record("RAC456B"));
        ledger.reload().await.unwrap();

        assert_eq!(ledger.len(), 2);
        assert!(ledger.find_by_plate(&Plate::new("RAC456B").unwrap()).is_some());
        assert!(matches!(ledger.record(stale), Err(StorageError::InvalidHandle)));
        assert!(matches!(ledger.mark_paid(stale), Err(StorageError::InvalidHandle)));
    }
}
