use super::LedgerStore;
use crate::connection::{Database, DatabaseConfig};
use crate::error::{StorageError, StorageResult};
use crate::models::VehicleRecord;
use parkgate_core::{LedgerTimestamp, PaymentStatus, Plate};
use tracing::debug;

/// Raw `vehicles` row, before validation.
#[derive(Debug, sqlx::FromRow)]
struct VehicleRow {
    id: i64,
    plate: String,
    entry_time: String,
    exit_time: Option<String>,
    due_amount: Option<i64>,
    payment_status: i64,
}

impl VehicleRow {
    fn to_record(&self, row: usize) -> StorageResult<VehicleRecord> {
        let corrupt = |reason: String| StorageError::corrupt(row, reason);

        let plate = Plate::new(&self.plate).map_err(|e| corrupt(e.to_string()))?;
        let entry_time =
            LedgerTimestamp::parse(&self.entry_time).map_err(|e| corrupt(e.to_string()))?;
        let exit_time = self
            .exit_time
            .as_deref()
            .map(LedgerTimestamp::parse)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let due_amount = self
            .due_amount
            .map(u64::try_from)
            .transpose()
            .map_err(|_| corrupt(format!("negative due amount {:?}", self.due_amount)))?;
        let payment_status = u8::try_from(self.payment_status)
            .ok()
            .and_then(|code| PaymentStatus::from_u8(code).ok())
            .ok_or_else(|| corrupt(format!("invalid payment status {}", self.payment_status)))?;

        Ok(VehicleRecord {
            plate,
            entry_time,
            exit_time,
            due_amount,
            payment_status,
        })
    }
}

/// Ledger kept in the `vehicles` table of a SQLite database.
///
/// Row order is the insertion order (`id`). Saving rewrites the table inside
/// one transaction; updates change a single row by `id`, guarded by the
/// values it was read with, so rows inserted by the entry side survive.
#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    db: Database,
}

impl SqliteLedgerStore {
    /// Open (and migrate) the database described by `config`.
    pub async fn open(config: DatabaseConfig) -> StorageResult<Self> {
        Ok(Self {
            db: Database::open(config).await?,
        })
    }

    /// Private in-memory ledger (primarily for testing).
    pub async fn in_memory() -> StorageResult<Self> {
        Ok(Self {
            db: Database::in_memory().await?,
        })
    }

    /// Get the underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl LedgerStore for SqliteLedgerStore {
    async fn load(&self) -> StorageResult<Vec<VehicleRecord>> {
        let rows = sqlx::query_as::<_, VehicleRow>(
            r#"
            SELECT id, plate, entry_time, exit_time, due_amount, payment_status
            FROM vehicles
            ORDER BY id
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        let records = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| row.to_record(index + 1))
            .collect::<StorageResult<Vec<_>>>()?;

        debug!(location = %self.db.location(), count = records.len(), "Ledger loaded");
        Ok(records)
    }

    async fn save(&mut self, records: &[VehicleRecord]) -> StorageResult<()> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query("DELETE FROM vehicles").execute(&mut *tx).await?;

        for (index, record) in records.iter().enumerate() {
            let due_amount = stored_amount(record, index + 1)?;

            sqlx::query(
                r#"
                INSERT INTO vehicles (
                    plate, entry_time, exit_time, due_amount, payment_status
                )
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.plate.as_str())
            .bind(record.entry_time.format())
            .bind(record.exit_time.map(|t| t.format()))
            .bind(due_amount)
            .bind(i64::from(record.payment_status.to_u8()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(location = %self.db.location(), count = records.len(), "Ledger saved");
        Ok(())
    }

    async fn update(
        &mut self,
        row: usize,
        previous: &VehicleRecord,
        record: &VehicleRecord,
    ) -> StorageResult<()> {
        let conflict = || StorageError::Conflict {
            plate: previous.plate.to_string(),
        };
        let offset = i64::try_from(row).map_err(|_| conflict())?;

        let stored = sqlx::query_as::<_, VehicleRow>(
            r#"
            SELECT id, plate, entry_time, exit_time, due_amount, payment_status
            FROM vehicles
            ORDER BY id
            LIMIT 1 OFFSET ?
            "#,
        )
        .bind(offset)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(conflict)?;

        if stored.to_record(row + 1)? != *previous {
            return Err(conflict());
        }

        // Matching on the raw stored values catches a write that slipped in
        // between the read and this statement.
        let result = sqlx::query(
            r#"
            UPDATE vehicles
            SET exit_time = ?, due_amount = ?, payment_status = ?
            WHERE id = ?
              AND plate = ?
              AND entry_time = ?
              AND exit_time IS ?
              AND due_amount IS ?
              AND payment_status = ?
            "#,
        )
        .bind(record.exit_time.map(|t| t.format()))
        .bind(stored_amount(record, row + 1)?)
        .bind(i64::from(record.payment_status.to_u8()))
        .bind(stored.id)
        .bind(stored.plate.as_str())
        .bind(stored.entry_time.as_str())
        .bind(stored.exit_time.as_deref())
        .bind(stored.due_amount)
        .bind(stored.payment_status)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() != 1 {
            return Err(conflict());
        }

        debug!(location = %self.db.location(), id = stored.id, "Ledger row updated");
        Ok(())
    }

    fn location(&self) -> String {
        format!("sqlite://{}", self.db.location())
    }
}

fn stored_amount(record: &VehicleRecord, row: usize) -> StorageResult<Option<i64>> {
    record
        .due_amount
        .map(i64::try_from)
        .transpose()
        .map_err(|_| StorageError::corrupt(row, "due amount exceeds storage range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(plate: &str, entry: &str) -> VehicleRecord {
        VehicleRecord::new(
            Plate::new(plate).unwrap(),
            LedgerTimestamp::parse(entry).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_save_then_load_preserves_order_and_blanks() {
        let mut store = SqliteLedgerStore::in_memory().await.unwrap();

        let mut settled = record("RAB123A", "2024-01-01 10:00:00");
        settled.exit_time = Some(LedgerTimestamp::parse("2024-01-01 12:00:00").unwrap());
        settled.due_amount = Some(400);
        settled.payment_status = PaymentStatus::Paid;
        let open = record("RAC456B", "2024-01-01 11:15:00");

        store.save(&[settled.clone(), open.clone()]).await.unwrap();
        assert_eq!(store.load().await.unwrap(), vec![settled, open]);
    }

    #[tokio::test]
    async fn test_save_replaces_previous_contents() {
        let mut store = SqliteLedgerStore::in_memory().await.unwrap();

        store
            .save(&[record("A", "2024-01-01 10:00:00"), record("B", "2024-01-01 10:00:00")])
            .await
            .unwrap();
        store.save(&[record("C", "2024-01-01 10:00:00")]).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].plate.as_str(), "C");
    }

    #[tokio::test]
    async fn test_update_leaves_inserted_rows_alone() {
        let mut store = SqliteLedgerStore::in_memory().await.unwrap();
        let open = record("RAB123A", "2024-01-01 10:00:00");
        store.save(&[open.clone()]).await.unwrap();

        // The entry side inserts while settlement waits for the card.
        sqlx::query(
            "INSERT INTO vehicles (plate, entry_time, payment_status) VALUES ('RAC999Z', '2024-01-01 11:59:00', 0)",
        )
        .execute(store.database().pool())
        .await
        .unwrap();

        let mut settled = open.clone();
        settled.exit_time = Some(LedgerTimestamp::parse("2024-01-01 12:00:00").unwrap());
        settled.due_amount = Some(400);
        settled.payment_status = PaymentStatus::Paid;
        store.update(0, &open, &settled).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, vec![settled, record("RAC999Z", "2024-01-01 11:59:00")]);
    }

    #[tokio::test]
    async fn test_update_rejects_row_changed_underneath() {
        let mut store = SqliteLedgerStore::in_memory().await.unwrap();
        let open = record("RAB123A", "2024-01-01 10:00:00");
        store.save(&[open.clone()]).await.unwrap();

        sqlx::query("UPDATE vehicles SET payment_status = 1")
            .execute(store.database().pool())
            .await
            .unwrap();

        let mut settled = open.clone();
        settled.due_amount = Some(400);

        assert!(matches!(
            store.update(0, &open, &settled).await,
            Err(StorageError::Conflict { .. })
        ));
        assert!(matches!(
            store.update(1, &open, &settled).await,
            Err(StorageError::Conflict { .. })
        ));
        assert_eq!(store.load().await.unwrap()[0].due_amount, None);
    }

    #[tokio::test]
    async fn test_load_reports_corrupt_rows() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();

        sqlx::query(
            "INSERT INTO vehicles (plate, entry_time, payment_status) VALUES ('A', 'not a time', 0)",
        )
        .execute(store.database().pool())
        .await
        .unwrap();

        assert!(matches!(
            store.load().await,
            Err(StorageError::Corrupt { row: 1, .. })
        ));
    }
}
