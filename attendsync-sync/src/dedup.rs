//! Duplicate filter in front of a [`RecordStore`].
//!
//! Reads every persisted UID (full scan), keeps incoming records whose UID is
//! neither persisted nor already seen earlier in the same batch, and appends
//! the survivors in input order. An empty difference issues no write.

use std::collections::HashSet;

use attendsync_core::AttendanceRecord;

use crate::error::StoreError;
use crate::store::{record_to_row, RecordStore, Row, COLUMNS};

/// Append records not already present in `store`. Returns the count appended.
pub fn append_new(
    store: &dyn RecordStore,
    records: &[AttendanceRecord],
) -> Result<usize, StoreError> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut seen: HashSet<String> = store.read_keys()?.into_iter().collect();
    let existing = seen.len();

    let rows: Vec<Row> = records
        .iter()
        .filter(|record| seen.insert(record.uid.clone()))
        .map(record_to_row)
        .collect();

    tracing::debug!(
        "dedup: {} incoming, {} persisted keys, {} new",
        records.len(),
        existing,
        rows.len()
    );

    if rows.is_empty() {
        return Ok(0);
    }
    store.append_rows(&rows)
}

/// Write the header row if the store has none. Returns whether it wrote.
pub fn ensure_header(store: &dyn RecordStore) -> Result<bool, StoreError> {
    let has_header = store
        .read_header()?
        .map(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .unwrap_or(false);
    if has_header {
        return Ok(false);
    }
    store.write_header(&COLUMNS)?;
    tracing::info!("wrote header row ({} columns)", COLUMNS.len());
    Ok(true)
}
