//! Caller-facing surface over the orchestrator and scheduler.
//!
//! Every operation answers with a [`DaemonResponse`]; failures are
//! classified and described, never propagated.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use attendsync_core::{AppConfig, Criteria, FailureKind, TimeWindow};

use crate::orchestrator::{Orchestrator, SyncOutcome};
use crate::protocol::DaemonResponse;
use crate::scheduler::Scheduler;

pub struct SyncService {
    orchestrator: Arc<Orchestrator>,
    scheduler: Scheduler,
    default_schedule: String,
    started_at: DateTime<Utc>,
}

impl SyncService {
    pub fn new(orchestrator: Arc<Orchestrator>, default_schedule: impl Into<String>) -> Self {
        Self {
            scheduler: Scheduler::new(orchestrator.clone()),
            orchestrator,
            default_schedule: default_schedule.into(),
            started_at: Utc::now(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Arc::new(Orchestrator::from_config(config)),
            config.sync.schedule.clone(),
        )
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub async fn initialize(&self) -> DaemonResponse {
        match self.orchestrator.initialize().await {
            Ok(wrote) => {
                let message = if wrote {
                    "store initialised: header row written"
                } else {
                    "store already initialised"
                };
                DaemonResponse::ok(message, json!({ "header_written": wrote }))
            }
            Err(failure) => DaemonResponse::failure(failure.kind, failure.message),
        }
    }

    pub async fn run_auto_sync(&self) -> DaemonResponse {
        outcome_response(self.orchestrator.run_auto_sync().await)
    }

    pub async fn run_manual_sync(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DaemonResponse {
        let window = TimeWindow::new(start, end);
        if !window.is_ordered() {
            return invalid_window(window);
        }
        outcome_response(self.orchestrator.run_manual_sync(window).await)
    }

    pub async fn query_records(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        criteria: Option<Criteria>,
        limit: Option<usize>,
    ) -> DaemonResponse {
        let window = TimeWindow::new(start, end);
        if !window.is_ordered() {
            return invalid_window(window);
        }
        match self
            .orchestrator
            .query_records(window, criteria, limit)
            .await
        {
            Ok(report) => DaemonResponse::ok(
                format!(
                    "{} valid record(s) of {} fetched",
                    report.records.len(),
                    report.fetched
                ),
                json!({
                    "window": window,
                    "fetched": report.fetched,
                    "dropped": report.dropped,
                    "project": report.project,
                    "records": report.records,
                }),
            ),
            Err(failure) => DaemonResponse::failure(failure.kind, failure.message),
        }
    }

    /// Start the recurring sync with `expression`, or the configured
    /// schedule when `None`.
    pub async fn start_schedule(&self, expression: Option<String>) -> DaemonResponse {
        let expression = expression.unwrap_or_else(|| self.default_schedule.clone());
        match self.scheduler.start(&expression).await {
            Ok(true) => DaemonResponse::ok(
                format!("schedule started: {expression}"),
                json!({ "started": true, "schedule": expression }),
            ),
            Ok(false) => DaemonResponse::ok(
                "schedule already running",
                json!({ "started": false, "schedule": self.scheduler.expression().await }),
            ),
            Err(err) => DaemonResponse::failure(err.kind(), err.to_string()),
        }
    }

    pub async fn stop_schedule(&self) -> DaemonResponse {
        let stopped = self.scheduler.stop().await;
        let message = if stopped {
            "schedule stopped"
        } else {
            "schedule was not running"
        };
        DaemonResponse::ok(message, json!({ "stopped": stopped }))
    }

    pub async fn is_schedule_running(&self) -> bool {
        self.scheduler.is_running().await
    }

    pub async fn schedule_status(&self) -> DaemonResponse {
        let running = self.scheduler.is_running().await;
        DaemonResponse::ok(
            if running {
                "schedule running"
            } else {
                "schedule stopped"
            },
            json!({
                "running": running,
                "schedule": self.scheduler.expression().await,
                "next_run": self.scheduler.next_fire().await,
            }),
        )
    }

    pub async fn get_status(&self) -> DaemonResponse {
        let status = self.orchestrator.status().await;
        let policy = self.orchestrator.policy();
        DaemonResponse::ok(
            if status.syncing { "syncing" } else { "idle" },
            json!({
                "pid": std::process::id(),
                "started_at": self.started_at,
                "syncing": status.syncing,
                "skipped_auto_syncs": status.skipped_auto_syncs,
                "watermark": status.watermark,
                "last_result": status.last_result,
                "schedule": {
                    "running": self.scheduler.is_running().await,
                    "expression": self.scheduler.expression().await,
                    "next_run": self.scheduler.next_fire().await,
                },
                "lookback_hours": policy.lookback_hours,
                "criteria": policy.criteria,
            }),
        )
    }

    pub async fn get_last_result(&self) -> DaemonResponse {
        match self.orchestrator.last_result().await {
            Some(result) => DaemonResponse {
                success: result.success,
                message: result.message.clone(),
                data: Some(json!(result)),
                error: result.error.map(|kind| kind.to_string()),
            },
            None => DaemonResponse::ok("no sync has run yet", serde_json::Value::Null),
        }
    }

    pub async fn test_connectivity(&self) -> DaemonResponse {
        let report = self.orchestrator.test_connectivity().await;
        let data = json!(report);
        if report.ok() {
            return DaemonResponse::ok("source and store reachable", data);
        }
        let failed = if report.source.ok {
            &report.store
        } else {
            &report.source
        };
        DaemonResponse::failure(
            failed.error.unwrap_or(FailureKind::Internal),
            failed.message.clone(),
        )
        .with_data(data)
    }

    /// Stop the schedule ahead of shutdown.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
    }
}

fn outcome_response(outcome: SyncOutcome) -> DaemonResponse {
    match outcome {
        SyncOutcome::Succeeded(result) => DaemonResponse::ok(result.message.clone(), json!(result)),
        SyncOutcome::Skipped => DaemonResponse::ok(
            "skipped: a sync is already running",
            json!({ "skipped": true }),
        ),
        SyncOutcome::Failed {
            kind,
            message,
            result,
        } => {
            let response = DaemonResponse::failure(kind, message);
            match result {
                Some(result) => response.with_data(json!(result)),
                None => response,
            }
        }
    }
}

fn invalid_window(window: TimeWindow) -> DaemonResponse {
    DaemonResponse::failure(
        FailureKind::InvalidWindow,
        format!("start must be before end: {window}"),
    )
}
