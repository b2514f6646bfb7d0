use super::{CsvLedgerStore, LedgerStore, MemoryLedgerStore, SqliteLedgerStore};
use crate::connection::DatabaseConfig;
use crate::error::StorageResult;
use crate::models::VehicleRecord;
use parkgate_core::{LedgerBackend, LedgerConfig};

/// Enum wrapper for runtime backend selection.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyLedgerStore {
    Csv(CsvLedgerStore),
    Sqlite(SqliteLedgerStore),
    Memory(MemoryLedgerStore),
}

impl AnyLedgerStore {
    /// Open the store described by `config`.
    pub async fn open(config: &LedgerConfig) -> StorageResult<Self> {
        match config.backend {
            LedgerBackend::Csv => CsvLedgerStore::open(config.path.clone())
                .await
                .map(Self::Csv),
            LedgerBackend::Sqlite => SqliteLedgerStore::open(DatabaseConfig::from(config))
                .await
                .map(Self::Sqlite),
        }
    }
}

impl LedgerStore for AnyLedgerStore {
    async fn load(&self) -> StorageResult<Vec<VehicleRecord>> {
        match self {
            Self::Csv(store) => store.load().await,
            Self::Sqlite(store) => store.load().await,
            Self::Memory(store) => store.load().await,
        }
    }

    async fn save(&mut self, records: &[VehicleRecord]) -> StorageResult<()> {
        match self {
            Self::Csv(store) => store.save(records).await,
            Self::Sqlite(store) => store.save(records).await,
            Self::Memory(store) => store.save(records).await,
        }
    }

    async fn update(
        &mut self,
        row: usize,
        previous: &VehicleRecord,
        record: &VehicleRecord,
    ) -> StorageResult<()> {
        match self {
            Self::Csv(store) => store.update(row, previous, record).await,
            Self::Sqlite(store) => store.update(row, previous, record).await,
            Self::Memory(store) => store.update(row, previous, record).await,
        }
    }

    fn location(&self) -> String {
        match self {
            Self::Csv(store) => store.location(),
            Self::Sqlite(store) => store.location(),
            Self::Memory(store) => store.location(),
        }
    }
}
