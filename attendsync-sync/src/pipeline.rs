//! Blocking sync pipeline shared by the daemon and the CLI.
//!
//! fetch (all pages) → normalize → append new. Window selection, the
//! single-flight guard and watermark bookkeeping live with the caller.

use thiserror::Error;

use attendsync_core::{AttendanceRecord, FailureKind, ProjectDescriptor};

use crate::dedup::append_new;
use crate::error::SyncError;
use crate::normalize::normalize;
use crate::source::{collect_pages, FetchQuery, RecordSource};
use crate::store::RecordStore;

/// Counts from one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Raw records received from upstream, before validation.
    pub fetched: usize,
    pub dropped: usize,
    pub added: usize,
    pub pages: u32,
}

/// A failed run and the counts gathered before it stopped.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    pub report: SyncReport,
    #[source]
    pub error: SyncError,
}

impl RunFailure {
    fn new(report: SyncReport, error: impl Into<SyncError>) -> Self {
        Self {
            report,
            error: error.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.error.kind()
    }
}

/// Result of a read-only fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryReport {
    pub records: Vec<AttendanceRecord>,
    pub fetched: usize,
    pub dropped: usize,
    pub project: ProjectDescriptor,
}

/// Fetch `query`, drop invalid records and append the unseen ones.
///
/// An empty fetch and an all-invalid batch both return `added == 0` without
/// touching the store. A store failure keeps the fetch counts in the error.
pub fn run(
    source: &dyn RecordSource,
    store: &dyn RecordStore,
    query: &FetchQuery,
) -> Result<SyncReport, RunFailure> {
    let batch =
        collect_pages(source, query).map_err(|err| RunFailure::new(SyncReport::default(), err))?;
    let mut report = SyncReport {
        fetched: batch.records.len(),
        pages: batch.pages,
        ..SyncReport::default()
    };

    if batch.records.is_empty() {
        tracing::info!("no records in window {}", query.window);
        return Ok(report);
    }

    let normalized = normalize(batch.records, &batch.project);
    report.dropped = normalized.dropped.len();

    if normalized.records.is_empty() {
        tracing::info!(
            "all {} fetched record(s) failed validation; nothing to append",
            report.fetched
        );
        return Ok(report);
    }

    report.added =
        append_new(store, &normalized.records).map_err(|err| RunFailure::new(report, err))?;
    tracing::info!(
        "window {}: fetched {}, dropped {}, added {}",
        query.window,
        report.fetched,
        report.dropped,
        report.added
    );
    Ok(report)
}

/// Fetch and normalize without writing. `limit` truncates the returned
/// records, not the counts.
pub fn query(
    source: &dyn RecordSource,
    query: &FetchQuery,
    limit: Option<usize>,
) -> Result<QueryReport, SyncError> {
    let batch = collect_pages(source, query)?;
    let fetched = batch.records.len();
    let project = batch.project.clone();
    let mut normalized = normalize(batch.records, &batch.project);
    if let Some(limit) = limit {
        normalized.records.truncate(limit);
    }
    Ok(QueryReport {
        records: normalized.records,
        fetched,
        dropped: normalized.dropped.len(),
        project,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    use attendsync_core::{Criteria, TimeWindow};

    use super::*;
    use crate::error::{SourceError, StoreError};
    use crate::memory::MemoryStore;
    use crate::source::{FetchBatch, PageLinks, RawRecord};
    use crate::store::{Row, StoreInfo};

    struct FixedSource(Mutex<Vec<Vec<RawRecord>>>);

    impl FixedSource {
        fn new(batches: Vec<Vec<RawRecord>>) -> Self {
            Self(Mutex::new(batches))
        }
    }

    impl RecordSource for FixedSource {
        fn fetch_page(&self, _query: &FetchQuery, _page: u32) -> Result<FetchBatch, SourceError> {
            let mut batches = self.0.lock().unwrap();
            let records = if batches.is_empty() {
                Vec::new()
            } else {
                batches.remove(0)
            };
            Ok(FetchBatch {
                records,
                project: ProjectDescriptor::default(),
                meta: Value::Null,
                links: PageLinks::default(),
                pages: 1,
            })
        }
    }

    struct BrokenStore;

    impl RecordStore for BrokenStore {
        fn read_keys(&self) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Http {
                status: 403,
                message: "forbidden".into(),
            })
        }
        fn append_rows(&self, _rows: &[Row]) -> Result<usize, StoreError> {
            unreachable!("append after failed read")
        }
        fn read_header(&self) -> Result<Option<Row>, StoreError> {
            Ok(None)
        }
        fn write_header(&self, _header: &[&str]) -> Result<(), StoreError> {
            Ok(())
        }
        fn clear(&self) -> Result<(), StoreError> {
            Ok(())
        }
        fn describe(&self) -> Result<StoreInfo, StoreError> {
            unreachable!()
        }
    }

    fn raw(uid: &str) -> RawRecord {
        RawRecord {
            uid: Some(uid.to_string()),
            sync_time: Some("2024-05-01T08:00:05Z".into()),
            logged_time: Some("2024-05-01T08:00:00Z".into()),
            kind: Some("card".into()),
            device_id: Some("gate".into()),
            person_identifier: Some("emp".into()),
            ..RawRecord::default()
        }
    }

    fn fetch_query() -> FetchQuery {
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        FetchQuery {
            window: TimeWindow::trailing_hours(end, 24),
            criteria: Criteria::SyncTime,
            page_size: 100,
            max_pages: 5,
        }
    }

    #[test]
    fn second_run_appends_only_unseen_uids() {
        let source = FixedSource::new(vec![
            vec![raw("a"), raw("b"), raw("c")],
            vec![raw("b"), raw("c"), raw("d")],
        ]);
        let store = MemoryStore::new();

        let first = run(&source, &store, &fetch_query()).unwrap();
        assert_eq!((first.fetched, first.added), (3, 3));

        let second = run(&source, &store, &fetch_query()).unwrap();
        assert_eq!((second.fetched, second.added), (3, 1));
        assert_eq!(store.keys(), ["a", "b", "c", "d"]);
    }

    #[test]
    fn invalid_record_counts_as_fetched_not_added() {
        let mut missing_person = raw("x");
        missing_person.person_identifier = None;
        let source = FixedSource::new(vec![vec![raw("a"), missing_person]]);
        let store = MemoryStore::new();

        let report = run(&source, &store, &fetch_query()).unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.added, 1);
        assert_eq!(store.keys(), ["a"]);
    }

    #[test]
    fn empty_and_all_invalid_batches_never_touch_the_store() {
        let source = FixedSource::new(vec![vec![], vec![RawRecord::default()]]);
        let report = run(&source, &BrokenStore, &fetch_query()).unwrap();
        assert_eq!(report, SyncReport { pages: 1, ..SyncReport::default() });

        let report = run(&source, &BrokenStore, &fetch_query()).unwrap();
        assert_eq!((report.fetched, report.dropped, report.added), (1, 1, 0));
    }

    #[test]
    fn store_failure_aborts_the_run() {
        let source = FixedSource::new(vec![vec![raw("a")]]);
        let err = run(&source, &BrokenStore, &fetch_query()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::StoreError);
    }

    #[test]
    fn store_failure_keeps_fetch_counts() {
        let mut bad = raw("bad");
        bad.device_id = None;
        let source = FixedSource::new(vec![vec![raw("a"), bad, raw("b")]]);
        let err = run(&source, &BrokenStore, &fetch_query()).unwrap_err();
        assert_eq!(
            err.report,
            SyncReport {
                fetched: 3,
                dropped: 1,
                added: 0,
                pages: 1,
            }
        );
        assert!(matches!(err.error, SyncError::Store(_)));
    }

    #[test]
    fn query_applies_limit_after_validation() {
        let mut bad = raw("bad");
        bad.kind = Some("palm".into());
        let source = FixedSource::new(vec![vec![bad, raw("a"), raw("b"), raw("c")]]);

        let report = query(&source, &fetch_query(), Some(2)).unwrap();
        let uids: Vec<_> = report.records.iter().map(|r| r.uid.as_str()).collect();
        assert_eq!(uids, ["a", "b"]);
        assert_eq!(report.fetched, 4);
        assert_eq!(report.dropped, 1);
    }
}
