//! Recurring trigger for [`Orchestrator::run_auto_sync`].
//!
//! The schedule task sleeps until the next cron fire time and spawns an
//! auto sync without awaiting it. Overlap is prevented by the
//! orchestrator's guard, not here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::cron::CronSchedule;
use crate::error::ScheduleError;
use crate::orchestrator::{Orchestrator, SyncOutcome};

struct ActiveSchedule {
    schedule: CronSchedule,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    active: Mutex<Option<ActiveSchedule>>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            active: Mutex::new(None),
        }
    }

    /// Validate `expression` and start ticking.
    ///
    /// Returns `Ok(false)` without changing anything if a schedule is
    /// already running.
    pub async fn start(&self, expression: &str) -> Result<bool, ScheduleError> {
        let schedule = CronSchedule::parse(expression)?;
        if schedule.next_after(Utc::now()).is_none() {
            return Err(ScheduleError::invalid(expression, "expression never fires"));
        }

        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            if !current.task.is_finished() {
                tracing::info!(schedule = %current.schedule, "schedule already running");
                return Ok(false);
            }
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(tick_loop(
            schedule.clone(),
            self.orchestrator.clone(),
            stop_rx,
        ));
        tracing::info!(%schedule, "schedule started");
        *active = Some(ActiveSchedule {
            schedule,
            stop_tx,
            task,
        });
        Ok(true)
    }

    /// Signal the schedule task to stop. Returns `false` if none was running.
    /// A sync already in flight runs to completion.
    pub async fn stop(&self) -> bool {
        let Some(active) = self.active.lock().await.take() else {
            return false;
        };
        let was_running = !active.task.is_finished();
        let _ = active.stop_tx.send(());
        if was_running {
            tracing::info!(schedule = %active.schedule, "schedule stopped");
        }
        was_running
    }

    pub async fn is_running(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|active| !active.task.is_finished())
    }

    /// Expression of the running schedule, if any.
    pub async fn expression(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|active| !active.task.is_finished())
            .map(|active| active.schedule.to_string())
    }

    /// Next fire time of the running schedule, if any.
    pub async fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|active| !active.task.is_finished())
            .and_then(|active| active.schedule.next_after(Utc::now()))
    }
}

async fn tick_loop(
    schedule: CronSchedule,
    orchestrator: Arc<Orchestrator>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut cursor = Utc::now();
    loop {
        let Some(next) = schedule.next_after(cursor) else {
            tracing::warn!(%schedule, "schedule has no further fire times; stopping");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();

        tokio::select! {
            _ = &mut stop_rx => return,
            _ = tokio::time::sleep(wait) => {
                cursor = resume_from(next, Utc::now());
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    match orchestrator.run_auto_sync().await {
                        SyncOutcome::Succeeded(_) | SyncOutcome::Skipped => {}
                        SyncOutcome::Failed { kind, .. } => {
                            tracing::warn!(error = %kind, "scheduled sync failed");
                        }
                    }
                });
            }
        }
    }
}

/// Where the search for the next fire time resumes after firing `fired`.
/// A late wake-up skips the missed slots instead of replaying them.
fn resume_from(fired: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    now.max(fired)
}
