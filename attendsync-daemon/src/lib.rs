//! attendsync daemon: sync orchestrator, cron scheduler, service facade and
//! the Unix-socket runtime that exposes them.

pub mod cron;
mod error;
pub mod orchestrator;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod scheduler;
pub mod service;

pub use cron::CronSchedule;
pub use error::{DaemonError, ScheduleError, SyncFailure};
pub use orchestrator::{
    ConnectivityReport, Orchestrator, OrchestratorStatus, SideCheck, SyncOutcome, SyncPolicy,
};
pub use protocol::{request_status, request_stop, send_request, DaemonRequest, DaemonResponse};
pub use runtime::{init_tracing, run, run_with_config, start_blocking};
pub use scheduler::Scheduler;
pub use service::SyncService;
