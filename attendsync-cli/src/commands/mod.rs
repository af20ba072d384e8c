pub mod daemon;
pub mod init;
pub mod query;
pub mod schedule;
pub mod status;
pub mod store;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use colored::Colorize;

use attendsync_daemon::{send_request, DaemonError, DaemonRequest, DaemonResponse};

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// clap value parser: RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC.
pub fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| {
            format!("invalid time '{raw}'; expected RFC 3339 or 'YYYY-MM-DD HH:MM:SS'")
        })
}

pub fn ensure_ordered(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if start >= end {
        bail!(
            "InvalidWindow: start must be before end ({} >= {})",
            start.to_rfc3339(),
            end.to_rfc3339()
        );
    }
    Ok(())
}

/// Send `request` to the running daemon.
pub fn request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse> {
    match send_request(home, request) {
        Ok(response) => Ok(response),
        Err(DaemonError::DaemonNotRunning { socket }) => bail!(
            "daemon is not running (no socket at {}); start it with `attendsync daemon start`",
            socket.display()
        ),
        Err(err) => Err(err).context("daemon request failed"),
    }
}

/// Print a successful response, or turn a failed one into an error carrying
/// its classification.
pub fn finish(response: &DaemonResponse) -> Result<()> {
    if response.success {
        println!("{} {}", "✓".green().bold(), response.message);
        return Ok(());
    }
    match response.error.as_deref() {
        Some(kind) => bail!("{kind}: {}", response.message),
        None => bail!("{}", response.message),
    }
}
