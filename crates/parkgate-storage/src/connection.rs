//! SQLite database behind [`SqliteLedgerStore`](crate::SqliteLedgerStore).
//!
//! The settlement process holds a single connection: it is the only writer
//! on its side, and sessions never overlap. WAL mode lets the entry gate
//! append rows from its own process while we read.

use crate::error::{StorageError, StorageResult};
use parkgate_core::LedgerConfig;
use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// How long a statement waits on a lock held by the entry side.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Ledger database settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Database file
    pub path: PathBuf,

    /// Wait on a locked database before failing
    pub busy_timeout: Duration,

    /// Create the file (and its directory) when missing
    pub create_if_missing: bool,

    /// Apply pending migrations on open
    pub auto_migrate: bool,
}

impl DatabaseConfig {
    /// Settings for the database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            create_if_missing: true,
            auto_migrate: true,
        }
    }

    /// Set the lock wait
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Set whether a missing database is created
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Set whether migrations run on open
    pub fn auto_migrate(mut self, migrate: bool) -> Self {
        self.auto_migrate = migrate;
        self
    }
}

impl From<&LedgerConfig> for DatabaseConfig {
    fn from(config: &LedgerConfig) -> Self {
        DatabaseConfig::new(&config.path)
    }
}

/// Open ledger database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    location: String,
}

impl Database {
    /// Open the database file described by `config`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use parkgate_storage::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::open(DatabaseConfig::new("data/ledger.db")).await?;
    /// println!("{} vehicles", db.vehicle_count().await?);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open(config: DatabaseConfig) -> StorageResult<Self> {
        if config.create_if_missing {
            ensure_parent_dir(&config.path)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(config.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(config.busy_timeout)
            .disable_statement_logging();

        let db = Self::connect(options, config.path.display().to_string()).await?;
        if config.auto_migrate {
            db.migrate().await?;
        }

        debug!(location = %db.location, "Ledger database open");
        Ok(db)
    }

    /// Private in-memory database, already migrated.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let db = Self::connect(options, ":memory:".to_string()).await?;
        db.migrate().await?;
        Ok(db)
    }

    async fn connect(options: SqliteConnectOptions, location: String) -> StorageResult<Self> {
        // A second connection to `:memory:` would be a different database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool, location })
    }

    /// Apply the migrations embedded from the workspace `migrations/`.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// File path, or `:memory:`.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Number of rows in the ledger table.
    pub async fn vehicle_count(&self) -> StorageResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM vehicles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.unsigned_abs())
    }

    /// Close the connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn ensure_parent_dir(path: &Path) -> StorageResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Configuration(format!(
                    "cannot create database directory {}: {e}",
                    parent.display()
                ))
            })
        }
        _ => Ok(()),
    }
}
