//! Scheduler lifecycle and the service facade.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::Value;

use attendsync_core::{FailureKind, ProjectDescriptor};
use attendsync_daemon::{Orchestrator, ScheduleError, Scheduler, SyncPolicy, SyncService};
use attendsync_sync::{FetchBatch, FetchQuery, MemoryStore, PageLinks, RecordSource, SourceError};

#[derive(Default)]
struct CountingSource {
    calls: AtomicUsize,
}

impl RecordSource for CountingSource {
    fn fetch_page(&self, _query: &FetchQuery, _page: u32) -> Result<FetchBatch, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FetchBatch {
            records: Vec::new(),
            project: ProjectDescriptor::default(),
            meta: Value::Null,
            links: PageLinks::default(),
            pages: 1,
        })
    }
}

/// Blocks the first fetch until released; later fetches return at once.
struct GatedSource {
    entered: AtomicUsize,
    gate: Mutex<Option<mpsc::Receiver<()>>>,
}

impl GatedSource {
    fn new() -> (Self, mpsc::Sender<()>) {
        let (release_tx, release_rx) = mpsc::channel();
        let source = Self {
            entered: AtomicUsize::new(0),
            gate: Mutex::new(Some(release_rx)),
        };
        (source, release_tx)
    }
}

impl RecordSource for GatedSource {
    fn fetch_page(&self, _query: &FetchQuery, _page: u32) -> Result<FetchBatch, SourceError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        if let Some(release) = gate {
            let _ = release.recv_timeout(Duration::from_secs(10));
        }
        Ok(FetchBatch {
            records: Vec::new(),
            project: ProjectDescriptor::default(),
            meta: Value::Null,
            links: PageLinks::default(),
            pages: 1,
        })
    }
}

fn orchestrator(source: Arc<CountingSource>) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        source,
        Arc::new(MemoryStore::new()),
        SyncPolicy::default(),
    ))
}

#[tokio::test]
async fn invalid_expression_never_starts() {
    let scheduler = Scheduler::new(orchestrator(Arc::default()));

    let err = scheduler.start("*/5 * *").await.unwrap_err();
    assert!(matches!(err, ScheduleError::Invalid { .. }));
    assert_eq!(err.kind(), FailureKind::InvalidSchedule);
    assert!(!scheduler.is_running().await);

    let err = scheduler.start("0 0 31 2 *").await.unwrap_err();
    assert!(err.to_string().contains("never fires"));
    assert!(!scheduler.is_running().await);
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let scheduler = Scheduler::new(orchestrator(Arc::default()));

    assert!(!scheduler.stop().await, "stop before start is a no-op");
    assert!(scheduler.start("0 0 1 1 *").await.unwrap());
    assert!(!scheduler.start("*/5 * * * *").await.unwrap(), "second start is a no-op");
    assert_eq!(scheduler.expression().await.as_deref(), Some("0 0 1 1 *"));
    assert!(scheduler.next_fire().await.is_some());

    assert!(scheduler.stop().await);
    assert!(!scheduler.stop().await);
    assert!(!scheduler.is_running().await);
    assert!(scheduler.expression().await.is_none());

    assert!(scheduler.start("*/5 * * * *").await.unwrap(), "restart after stop");
    scheduler.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn every_second_schedule_runs_auto_syncs() {
    let source = Arc::new(CountingSource::default());
    let orch = orchestrator(source.clone());
    let scheduler = Scheduler::new(orch.clone());

    assert!(scheduler.start("* * * * * *").await.unwrap());
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(scheduler.stop().await);
    // Let a sync spawned by the last tick finish.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let calls = source.calls.load(Ordering::SeqCst);
    assert!(calls >= 1, "expected at least one tick, got {calls}");
    assert!(orch.watermark().await.is_some());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(
        source.calls.load(Ordering::SeqCst),
        calls,
        "no ticks after stop"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_sync_does_not_hold_up_the_schedule() {
    let (source, release) = GatedSource::new();
    let source = Arc::new(source);
    let orch = Arc::new(Orchestrator::new(
        source.clone(),
        Arc::new(MemoryStore::new()),
        SyncPolicy::default(),
    ));
    let scheduler = Scheduler::new(orch.clone());

    assert!(scheduler.start("* * * * * *").await.unwrap());
    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert_eq!(source.entered.load(Ordering::SeqCst), 1, "one sync in flight");
    assert!(orch.is_syncing());
    assert!(
        orch.skipped_auto_syncs() >= 2,
        "ticks kept firing while the sync was blocked, skipped {}",
        orch.skipped_auto_syncs()
    );
    assert!(orch.last_result().await.is_none());

    release.send(()).expect("release");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(scheduler.stop().await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let result = orch.last_result().await.expect("recorded after release");
    assert!(result.success);
    assert!(orch.watermark().await.is_some());
    assert!(!orch.is_syncing());
}

#[tokio::test(flavor = "multi_thread")]
async fn service_rejects_reversed_windows() {
    let source = Arc::new(CountingSource::default());
    let service = SyncService::new(orchestrator(source.clone()), "*/5 * * * *");
    let start = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

    let manual = service.run_manual_sync(start, end).await;
    assert!(!manual.success);
    assert_eq!(manual.error.as_deref(), Some("InvalidWindow"));

    let query = service.query_records(start, start, None, None).await;
    assert_eq!(query.error.as_deref(), Some("InvalidWindow"));

    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    assert_eq!(service.get_last_result().await.data, Some(Value::Null));
}

#[tokio::test(flavor = "multi_thread")]
async fn service_reports_sync_and_schedule_state() {
    let service = SyncService::new(orchestrator(Arc::default()), "0 0 1 1 *");

    let init = service.initialize().await;
    assert!(init.success);
    assert_eq!(init.data.expect("data")["header_written"], true);

    let sync = service.run_auto_sync().await;
    assert!(sync.success);
    assert_eq!(sync.data.expect("data")["records_added"], 0);

    let started = service.start_schedule(None).await;
    assert!(started.success);
    assert!(service.is_schedule_running().await);

    let status = service.get_status().await;
    let data = status.data.expect("status data");
    assert_eq!(data["schedule"]["expression"], "0 0 1 1 *");
    assert!(data["watermark"].is_string());
    assert_eq!(data["last_result"]["mode"], "auto");

    let stopped = service.stop_schedule().await;
    assert_eq!(stopped.data.expect("data")["stopped"], true);
    assert!(!service.is_schedule_running().await);
}
