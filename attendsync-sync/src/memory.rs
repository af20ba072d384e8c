//! In-process table. Same contract as the Sheets backend, nothing persisted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::store::{RecordStore, Row, StoreInfo};

#[derive(Debug, Default)]
struct Table {
    header: Option<Row>,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    table: Mutex<Table>,
    append_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all data rows.
    pub fn rows(&self) -> Vec<Row> {
        self.lock().map(|t| t.rows.clone()).unwrap_or_default()
    }

    /// Snapshot of the UID column.
    pub fn keys(&self) -> Vec<String> {
        self.rows()
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect()
    }

    /// How many times `append_rows` reached the table.
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Table>, StoreError> {
        self.table
            .lock()
            .map_err(|_| StoreError::Transport("memory table lock poisoned".to_string()))
    }
}

impl RecordStore for MemoryStore {
    fn read_keys(&self) -> Result<Vec<String>, StoreError> {
        let table = self.lock()?;
        Ok(table
            .rows
            .iter()
            .filter_map(|row| row.first().cloned())
            .collect())
    }

    fn append_rows(&self, rows: &[Row]) -> Result<usize, StoreError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let mut table = self.lock()?;
        table.rows.extend_from_slice(rows);
        Ok(rows.len())
    }

    fn read_header(&self) -> Result<Option<Row>, StoreError> {
        Ok(self.lock()?.header.clone())
    }

    fn write_header(&self, header: &[&str]) -> Result<(), StoreError> {
        self.lock()?.header = Some(header.iter().map(|h| h.to_string()).collect());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.lock()?.rows.clear();
        Ok(())
    }

    fn describe(&self) -> Result<StoreInfo, StoreError> {
        let rows = self.lock()?.rows.len();
        Ok(StoreInfo {
            backend: "memory".to_string(),
            id: "memory".to_string(),
            title: format!("in-memory table ({rows} rows)"),
            sheets: vec!["memory".to_string()],
        })
    }
}
