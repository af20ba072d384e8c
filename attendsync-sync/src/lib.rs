//! # attendsync-sync
//!
//! Blocking building blocks of an attendance sync: the upstream log API
//! client, the record validator, the store capability with its Sheets and
//! in-memory backends, and the duplicate filter.
//!
//! [`pipeline::run`] chains them for one time window. Everything here blocks
//! the calling thread; async callers go through `spawn_blocking`.

pub mod dedup;
pub mod error;
pub mod memory;
pub mod normalize;
pub mod pipeline;
pub mod sheets;
pub mod source;
pub mod store;

pub use dedup::{append_new, ensure_header};
pub use error::{SourceError, StoreError, SyncError};
pub use memory::MemoryStore;
pub use normalize::{normalize, DropReason, Normalized, ValidationDrop};
pub use pipeline::{QueryReport, RunFailure, SyncReport};
pub use sheets::SheetsStore;
pub use source::{
    collect_pages, format_timestamp, FetchBatch, FetchQuery, HttpRecordSource, PageLinks,
    RawRecord, RecordSource,
};
pub use store::{record_to_row, RecordStore, Row, StoreInfo, COLUMNS};
