use std::path::PathBuf;

use thiserror::Error;

use attendsync_core::FailureKind;

/// Error surface for the daemon runtime and its socket protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] attendsync_core::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

/// Rejected cadence expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid schedule '{expression}': {reason}")]
    Invalid { expression: String, reason: String },
}

impl ScheduleError {
    pub(crate) fn invalid(expression: &str, reason: impl Into<String>) -> Self {
        ScheduleError::Invalid {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        FailureKind::InvalidSchedule
    }
}

/// Classified failure of a sync attempt or query, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct SyncFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl SyncFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<attendsync_sync::SyncError> for SyncFailure {
    fn from(err: attendsync_sync::SyncError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
