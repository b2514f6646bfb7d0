//! Ledger kept as a CSV file with a header row.
//!
//! ```text
//! Plate Number,Timestamp,Exit Time,Due Amount,Payment Status
//! RAB123A,2024-01-01 10:00:00,2024-01-01 12:00:00,400,1
//! RAC456B,2024-01-01 11:15:00,,,0
//! ```
//!
//! Columns are located by header name, so their order in an existing file
//! does not matter and unknown columns are ignored on load. Cells are
//! trimmed, blank optional cells read as absent, and integral decimals such
//! as `400.0` are accepted for amounts and status codes.
//!
//! An update re-reads the file and rewrites only the exit time, fee and
//! status cells of one row. Rows appended by the entry side, unknown columns
//! and the column order all survive. A full save writes the canonical
//! columns shown above.

use super::LedgerStore;
use crate::error::{StorageError, StorageResult};
use crate::models::VehicleRecord;
use csv::{Reader, ReaderBuilder, StringRecord, Terminator, Writer, WriterBuilder};
use parkgate_core::constants::{
    COLUMN_DUE_AMOUNT, COLUMN_ENTRY_TIME, COLUMN_EXIT_TIME, COLUMN_PAYMENT_STATUS, COLUMN_PLATE,
    LEDGER_COLUMNS,
};
use parkgate_core::{Amount, LedgerTimestamp, PaymentStatus, Plate};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// CSV file store.
#[derive(Debug, Clone)]
pub struct CsvLedgerStore {
    path: PathBuf,
}

impl CsvLedgerStore {
    /// Use the ledger file at `path`, writing a header-only ledger if the
    /// file does not exist yet or is empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the file cannot be inspected or created.
    pub async fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let mut store = Self { path: path.into() };

        let empty = match std::fs::metadata(&store.path) {
            Ok(metadata) => metadata.len() == 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        if empty {
            info!(path = %store.path.display(), "Writing empty ledger");
            store.save(&[]).await?;
        }

        Ok(store)
    }

    /// Path of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerStore for CsvLedgerStore {
    async fn load(&self) -> StorageResult<Vec<VehicleRecord>> {
        let path = self.path.clone();
        let records = tokio::task::spawn_blocking(move || read_ledger(&path))
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))??;

        debug!(path = %self.path.display(), count = records.len(), "Ledger loaded");
        Ok(records)
    }

    async fn save(&mut self, records: &[VehicleRecord]) -> StorageResult<()> {
        let path = self.path.clone();
        let records = records.to_vec();
        let count = records.len();

        tokio::task::spawn_blocking(move || write_ledger(&path, &records))
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))??;

        debug!(path = %self.path.display(), count, "Ledger saved");
        Ok(())
    }

    async fn update(
        &mut self,
        row: usize,
        previous: &VehicleRecord,
        record: &VehicleRecord,
    ) -> StorageResult<()> {
        let path = self.path.clone();
        let previous = previous.clone();
        let record = record.clone();

        tokio::task::spawn_blocking(move || update_ledger(&path, row, &previous, &record))
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))??;

        debug!(path = %self.path.display(), row, "Ledger row updated");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Column positions resolved from the header row.
struct Columns {
    plate: usize,
    entry_time: usize,
    exit_time: usize,
    due_amount: usize,
    payment_status: usize,
}

impl Columns {
    fn resolve(header: &StringRecord) -> StorageResult<Self> {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| StorageError::corrupt(1, format!("missing column '{name}'")))
        };

        Ok(Self {
            plate: find(COLUMN_PLATE)?,
            entry_time: find(COLUMN_ENTRY_TIME)?,
            exit_time: find(COLUMN_EXIT_TIME)?,
            due_amount: find(COLUMN_DUE_AMOUNT)?,
            payment_status: find(COLUMN_PAYMENT_STATUS)?,
        })
    }

    /// `row` with its settlement cells taken from `record`. Every other cell
    /// is kept verbatim.
    fn apply(&self, row: &StringRecord, record: &VehicleRecord) -> StringRecord {
        let exit_time = record.exit_time.map(|t| t.format()).unwrap_or_default();
        let due_amount = record.due_amount.map(|a| a.to_string()).unwrap_or_default();
        let status = record.payment_status.to_u8().to_string();

        let width = [self.exit_time, self.due_amount, self.payment_status]
            .into_iter()
            .map(|index| index + 1)
            .fold(row.len(), usize::max);

        let mut cells: Vec<&str> = row.iter().collect();
        cells.resize(width, "");
        cells[self.exit_time] = exit_time.as_str();
        cells[self.due_amount] = due_amount.as_str();
        cells[self.payment_status] = status.as_str();

        StringRecord::from(cells)
    }
}

fn open_reader(path: &Path) -> StorageResult<Reader<File>> {
    // Cells are trimmed when parsed so that rewritten rows keep their text.
    Ok(ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?)
}

/// 1-based file line of a data row; line 1 is the header.
fn line_of(row: &StringRecord, index: usize) -> usize {
    row.position()
        .map_or(index + 2, |p| usize::try_from(p.line()).unwrap_or(usize::MAX))
}

fn read_ledger(path: &Path) -> StorageResult<Vec<VehicleRecord>> {
    let mut reader = open_reader(path)?;
    let columns = Columns::resolve(reader.headers()?)?;

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        records.push(parse_row(&row, &columns, line_of(&row, index))?);
    }

    Ok(records)
}

fn update_ledger(
    path: &Path,
    index: usize,
    previous: &VehicleRecord,
    record: &VehicleRecord,
) -> StorageResult<()> {
    let mut reader = open_reader(path)?;
    let header = reader.headers()?.clone();
    let columns = Columns::resolve(&header)?;
    let mut rows = reader.records().collect::<Result<Vec<_>, _>>()?;

    let conflict = || StorageError::Conflict {
        plate: previous.plate.to_string(),
    };
    let row = rows.get(index).ok_or_else(conflict)?;
    if parse_row(row, &columns, line_of(row, index))? != *previous {
        return Err(conflict());
    }
    let updated = columns.apply(row, record);
    rows[index] = updated;

    replace_file(path, |writer| {
        writer.write_record(&header)?;
        for row in &rows {
            writer.write_record(row)?;
        }
        Ok(())
    })
}

fn parse_row(row: &StringRecord, columns: &Columns, line: usize) -> StorageResult<VehicleRecord> {
    let cell = |index: usize| row.get(index).unwrap_or("").trim();

    let plate = Plate::new(cell(columns.plate)).map_err(|e| StorageError::corrupt(line, e.to_string()))?;
    let entry_time = LedgerTimestamp::parse(cell(columns.entry_time))
        .map_err(|e| StorageError::corrupt(line, e.to_string()))?;

    let exit_time = match cell(columns.exit_time) {
        "" => None,
        raw => Some(
            LedgerTimestamp::parse(raw).map_err(|e| StorageError::corrupt(line, e.to_string()))?,
        ),
    };

    let due_amount = match cell(columns.due_amount) {
        "" => None,
        raw => Some(parse_whole_number(raw).ok_or_else(|| {
            StorageError::corrupt(line, format!("invalid {COLUMN_DUE_AMOUNT} {raw:?}"))
        })?),
    };

    let payment_status = match cell(columns.payment_status) {
        "" => PaymentStatus::Unpaid,
        raw => parse_whole_number(raw)
            .and_then(|code| u8::try_from(code).ok())
            .and_then(|code| PaymentStatus::from_u8(code).ok())
            .ok_or_else(|| {
                StorageError::corrupt(line, format!("invalid {COLUMN_PAYMENT_STATUS} {raw:?}"))
            })?,
    };

    Ok(VehicleRecord {
        plate,
        entry_time,
        exit_time,
        due_amount,
        payment_status,
    })
}

/// Parse a non-negative whole number, also accepting `400.0` style decimals
/// left behind by spreadsheet tools.
fn parse_whole_number(raw: &str) -> Option<Amount> {
    if let Ok(value) = raw.parse::<Amount>() {
        return Some(value);
    }

    let (whole, fraction) = raw.split_once('.')?;
    if fraction.is_empty() || !fraction.bytes().all(|b| b == b'0') {
        return None;
    }
    whole.parse::<Amount>().ok()
}

fn write_ledger(path: &Path, records: &[VehicleRecord]) -> StorageResult<()> {
    replace_file(path, |writer| {
        writer.write_record(LEDGER_COLUMNS)?;

        for record in records {
            let exit_time = record.exit_time.map(|t| t.format()).unwrap_or_default();
            let due_amount = record.due_amount.map(|a| a.to_string()).unwrap_or_default();
            let status = record.payment_status.to_u8().to_string();

            writer.write_record([
                record.plate.as_str(),
                record.entry_time.format().as_str(),
                exit_time.as_str(),
                due_amount.as_str(),
                status.as_str(),
            ])?;
        }
        Ok(())
    })
}

/// Write a new ledger file next to `path` and rename it into place.
fn replace_file<F>(path: &Path, write: F) -> StorageResult<()>
where
    F: FnOnce(&mut Writer<&mut File>) -> StorageResult<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = WriterBuilder::new()
            .terminator(Terminator::Any(b'\n'))
            .flexible(true)
            .from_writer(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }

    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
