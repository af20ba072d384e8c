//! Tabular store capability and the persisted row layout.
//!
//! Row 1 is the header; data starts at row 2. Column A (UID) is the dedup key.

use std::sync::Arc;

use serde::Serialize;

use attendsync_core::{AttendanceRecord, StoreConfig, StoreKind};

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::sheets::SheetsStore;

/// Persisted columns, in order.
pub const COLUMNS: [&str; 13] = [
    "UID",
    "Sync Time",
    "Logged Time",
    "Type",
    "Device ID",
    "Location",
    "Person ID",
    "RFID",
    "Primary Display",
    "Secondary Display",
    "Project Code",
    "Project Name",
    "Organization",
];

/// One persisted row, cells in [`COLUMNS`] order.
pub type Row = Vec<String>;

/// Store identity for health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreInfo {
    pub backend: String,
    pub id: String,
    pub title: String,
    pub sheets: Vec<String>,
}

/// Store capability. Implementations block the calling thread.
pub trait RecordStore: Send + Sync {
    /// Every value in the UID column below the header, in row order.
    fn read_keys(&self) -> Result<Vec<String>, StoreError>;

    /// Append rows after the last data row. Returns the number written.
    fn append_rows(&self, rows: &[Row]) -> Result<usize, StoreError>;

    /// Row 1, or `None` when the sheet has no header yet.
    fn read_header(&self) -> Result<Option<Row>, StoreError>;

    fn write_header(&self, header: &[&str]) -> Result<(), StoreError>;

    /// Remove every data row, keeping the header.
    fn clear(&self) -> Result<(), StoreError>;

    fn describe(&self) -> Result<StoreInfo, StoreError>;
}

/// Cells for `record`, in [`COLUMNS`] order.
pub fn record_to_row(record: &AttendanceRecord) -> Row {
    vec![
        record.uid.clone(),
        record.sync_time.clone(),
        record.logged_time.clone(),
        record.kind.to_string(),
        record.device_id.clone(),
        record.location.clone(),
        record.person_id.clone(),
        record.rfid.clone(),
        record.primary_display_text.clone(),
        record.secondary_display_text.clone(),
        record.project.code.clone(),
        record.project.name.clone(),
        record.project.organization.clone(),
    ]
}

/// Build the store backend described by `config`.
pub fn open(config: &StoreConfig) -> Arc<dyn RecordStore> {
    match config.kind {
        StoreKind::Sheets => Arc::new(SheetsStore::new(config)),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    }
}
