//! Sync orchestrator: owns the watermark, the single-flight guard and the
//! last result, and runs the blocking pipeline on the blocking pool.
//!
//! Auto syncs read `[watermark, now)` (or `[now - lookback, now)` on the
//! first run) and, on success, move the watermark to that captured `now`.
//! Manual syncs use a caller window and never touch the watermark. Both
//! share one guard: an auto sync that finds it taken is skipped, a manual
//! sync that finds it taken is rejected with `AlreadyRunning`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use attendsync_core::{AppConfig, Criteria, FailureKind, SyncMode, SyncResult, TimeWindow};
use attendsync_sync::{
    ensure_header, pipeline, store, FetchQuery, HttpRecordSource, QueryReport, RecordSource,
    RecordStore, StoreInfo, SyncReport,
};

use crate::error::SyncFailure;

/// Fetch parameters the orchestrator applies to every window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    pub lookback_hours: u32,
    pub criteria: Criteria,
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            lookback_hours: 24,
            criteria: Criteria::SyncTime,
            page_size: 100,
            max_pages: 50,
        }
    }
}

impl SyncPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            lookback_hours: config.sync.lookback_hours,
            criteria: config.source.criteria,
            page_size: config.source.page_size,
            max_pages: config.source.max_pages,
        }
    }

    fn query(&self, window: TimeWindow) -> FetchQuery {
        FetchQuery {
            window,
            criteria: self.criteria,
            page_size: self.page_size,
            max_pages: self.max_pages,
        }
    }
}

/// Result of one sync entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Succeeded(SyncResult),
    /// Auto sync found another sync in flight. Nothing was recorded.
    Skipped,
    /// `result` is `None` when the attempt never started (guard rejection).
    Failed {
        kind: FailureKind,
        message: String,
        result: Option<SyncResult>,
    },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Succeeded(_))
    }

    pub fn result(&self) -> Option<&SyncResult> {
        match self {
            SyncOutcome::Succeeded(result) => Some(result),
            SyncOutcome::Failed { result, .. } => result.as_ref(),
            SyncOutcome::Skipped => None,
        }
    }

    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            SyncOutcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Point-in-time view of orchestrator state.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub syncing: bool,
    /// Auto syncs skipped because another sync held the guard.
    pub skipped_auto_syncs: u64,
    pub watermark: Option<DateTime<Utc>>,
    pub last_result: Option<SyncResult>,
}

/// One side of a connectivity check.
#[derive(Debug, Clone, Serialize)]
pub struct SideCheck {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityReport {
    pub source: SideCheck,
    pub store: SideCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_info: Option<StoreInfo>,
}

impl ConnectivityReport {
    pub fn ok(&self) -> bool {
        self.source.ok && self.store.ok
    }
}

pub struct Orchestrator {
    source: Arc<dyn RecordSource>,
    store: Arc<dyn RecordStore>,
    policy: SyncPolicy,
    running: AtomicBool,
    skipped: AtomicU64,
    watermark: RwLock<Option<DateTime<Utc>>>,
    last_result: RwLock<Option<SyncResult>>,
}

/// Clears the running flag when the attempt ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn RecordSource>,
        store: Arc<dyn RecordStore>,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            source,
            store,
            policy,
            running: AtomicBool::new(false),
            skipped: AtomicU64::new(0),
            watermark: RwLock::new(None),
            last_result: RwLock::new(None),
        }
    }

    /// HTTP source and the configured store backend.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Arc::new(HttpRecordSource::new(&config.source)),
            store::open(&config.store),
            SyncPolicy::from_config(config),
        )
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    pub fn is_syncing(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn skipped_auto_syncs(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub async fn watermark(&self) -> Option<DateTime<Utc>> {
        *self.watermark.read().await
    }

    pub async fn last_result(&self) -> Option<SyncResult> {
        self.last_result.read().await.clone()
    }

    pub async fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            syncing: self.is_syncing(),
            skipped_auto_syncs: self.skipped_auto_syncs(),
            watermark: self.watermark().await,
            last_result: self.last_result().await,
        }
    }

    /// Write the header row if the store lacks one. Returns whether it wrote.
    pub async fn initialize(&self) -> Result<bool, SyncFailure> {
        let store = self.store.clone();
        let joined = tokio::task::spawn_blocking(move || ensure_header(store.as_ref())).await;
        match joined {
            Ok(Ok(wrote)) => Ok(wrote),
            Ok(Err(err)) => Err(SyncFailure::new(FailureKind::StoreError, err.to_string())),
            Err(err) => Err(join_failure(err)),
        }
    }

    /// Scheduled entry point.
    pub async fn run_auto_sync(&self) -> SyncOutcome {
        let Some(_guard) = self.try_acquire() else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::info!("auto sync skipped: another sync is running");
            return SyncOutcome::Skipped;
        };

        let now = Utc::now();
        let start = self.watermark().await.unwrap_or_else(|| {
            now - Duration::hours(i64::from(self.policy.lookback_hours))
        });
        let outcome = self
            .execute(SyncMode::Auto, TimeWindow::new(start, now), now)
            .await;

        if outcome.is_success() {
            let mut watermark = self.watermark.write().await;
            if watermark.map_or(true, |current| current < now) {
                *watermark = Some(now);
            }
        }
        outcome
    }

    /// Out-of-band sync over a caller window. The caller checks ordering.
    pub async fn run_manual_sync(&self, window: TimeWindow) -> SyncOutcome {
        let Some(_guard) = self.try_acquire() else {
            tracing::warn!(%window, "manual sync rejected: another sync is running");
            return SyncOutcome::Failed {
                kind: FailureKind::AlreadyRunning,
                message: "a sync is already running".to_string(),
                result: None,
            };
        };
        self.execute(SyncMode::Manual, window, Utc::now()).await
    }

    /// Fetch and validate without writing or touching sync state.
    pub async fn query_records(
        &self,
        window: TimeWindow,
        criteria: Option<Criteria>,
        limit: Option<usize>,
    ) -> Result<QueryReport, SyncFailure> {
        let mut query = self.policy.query(window);
        if let Some(criteria) = criteria {
            query = query.with_criteria(criteria);
        }
        let source = self.source.clone();
        let joined =
            tokio::task::spawn_blocking(move || pipeline::query(source.as_ref(), &query, limit))
                .await;
        match joined {
            Ok(result) => result.map_err(SyncFailure::from),
            Err(err) => Err(join_failure(err)),
        }
    }

    /// Check the source with a one-minute window and the store with
    /// `describe`. Neither check takes the guard.
    pub async fn test_connectivity(&self) -> ConnectivityReport {
        let now = Utc::now();
        let query = FetchQuery {
            page_size: 1,
            max_pages: 1,
            ..self.policy.query(TimeWindow::new(now - Duration::minutes(1), now))
        };
        let source = self.source.clone();
        let store = self.store.clone();

        let source_check = tokio::task::spawn_blocking(move || source.fetch_page(&query, 1));
        let store_check = tokio::task::spawn_blocking(move || store.describe());
        let (source_result, store_result) = tokio::join!(source_check, store_check);

        let source = match source_result {
            Ok(Ok(batch)) => SideCheck {
                ok: true,
                message: format!(
                    "source reachable ({} record(s) in the last minute)",
                    batch.records.len()
                ),
                error: None,
            },
            Ok(Err(err)) => SideCheck {
                ok: false,
                message: err.to_string(),
                error: Some(err.kind()),
            },
            Err(err) => failed_check(join_failure(err)),
        };

        let (store, store_info) = match store_result {
            Ok(Ok(info)) => (
                SideCheck {
                    ok: true,
                    message: format!("store reachable ({} '{}')", info.backend, info.title),
                    error: None,
                },
                Some(info),
            ),
            Ok(Err(err)) => (
                SideCheck {
                    ok: false,
                    message: err.to_string(),
                    error: Some(FailureKind::StoreError),
                },
                None,
            ),
            Err(err) => (failed_check(join_failure(err)), None),
        };

        ConnectivityReport {
            source,
            store,
            store_info,
        }
    }

    fn try_acquire(&self) -> Option<RunningGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard(&self.running))
    }

    /// Run one attempt and record it as the last result. Caller holds the guard.
    async fn execute(
        &self,
        mode: SyncMode,
        window: TimeWindow,
        started_at: DateTime<Utc>,
    ) -> SyncOutcome {
        let clock = Instant::now();
        tracing::info!(%mode, %window, "sync started");

        let source = self.source.clone();
        let store = self.store.clone();
        let query = self.policy.query(window);
        let joined = tokio::task::spawn_blocking(move || {
            pipeline::run(source.as_ref(), store.as_ref(), &query)
        })
        .await;

        let result = match joined {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(err)) => Err((SyncFailure::from(err.error), err.report)),
            Err(err) => Err((join_failure(err), SyncReport::default())),
        };
        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

        let outcome = match result {
            Ok(report) => {
                tracing::info!(
                    %mode,
                    fetched = report.fetched,
                    dropped = report.dropped,
                    added = report.added,
                    duration_ms,
                    "sync completed"
                );
                SyncOutcome::Succeeded(success_result(
                    mode,
                    window,
                    report,
                    started_at,
                    duration_ms,
                ))
            }
            Err((failure, partial)) => {
                tracing::error!(
                    %mode,
                    error = %failure.kind,
                    fetched = partial.fetched,
                    duration_ms,
                    "sync failed: {}",
                    failure.message
                );
                let result = SyncResult {
                    success: false,
                    message: failure.message.clone(),
                    mode,
                    window,
                    records_fetched: partial.fetched,
                    records_dropped: partial.dropped,
                    records_added: partial.added,
                    started_at,
                    duration_ms,
                    error: Some(failure.kind),
                };
                SyncOutcome::Failed {
                    kind: failure.kind,
                    message: failure.message,
                    result: Some(result),
                }
            }
        };

        if let Some(result) = outcome.result() {
            *self.last_result.write().await = Some(result.clone());
        }
        outcome
    }
}

fn success_result(
    mode: SyncMode,
    window: TimeWindow,
    report: SyncReport,
    started_at: DateTime<Utc>,
    duration_ms: u64,
) -> SyncResult {
    let message = if report.added == 0 {
        format!("no new records ({} fetched)", report.fetched)
    } else {
        format!(
            "added {} new record(s) ({} fetched)",
            report.added, report.fetched
        )
    };
    SyncResult {
        success: true,
        message,
        mode,
        window,
        records_fetched: report.fetched,
        records_dropped: report.dropped,
        records_added: report.added,
        started_at,
        duration_ms,
        error: None,
    }
}

fn join_failure(err: tokio::task::JoinError) -> SyncFailure {
    let message = if err.is_panic() {
        "sync task panicked".to_string()
    } else {
        format!("sync task did not complete: {err}")
    };
    SyncFailure::new(FailureKind::Internal, message)
}

fn failed_check(failure: SyncFailure) -> SideCheck {
    SideCheck {
        ok: false,
        message: failure.message,
        error: Some(failure.kind),
    }
}
