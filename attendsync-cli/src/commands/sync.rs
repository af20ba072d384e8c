//! `attendsync sync`: one sync through the daemon.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use attendsync_daemon::{DaemonRequest, DaemonResponse};

use super::{ensure_ordered, finish, home_dir, parse_time, request};

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Window start; with --end, runs a ranged sync that leaves the watermark alone.
    #[arg(long, value_parser = parse_time, requires = "end")]
    pub start: Option<DateTime<Utc>>,

    /// Window end (exclusive).
    #[arg(long, value_parser = parse_time, requires = "start")]
    pub end: Option<DateTime<Utc>>,

    /// Print the raw daemon response as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let sync_request = match (self.start, self.end) {
            (Some(start), Some(end)) => {
                ensure_ordered(start, end)?;
                DaemonRequest::ManualSync { start, end }
            }
            _ => DaemonRequest::Sync,
        };

        let home = home_dir()?;
        let response = request(&home, &sync_request)?;
        if !self.json {
            print_counts(&response);
            return finish(&response);
        }
        println!("{}", serde_json::to_string_pretty(&response)?);
        if !response.success {
            bail!(
                "{}: {}",
                response.error.as_deref().unwrap_or("sync failed"),
                response.message
            );
        }
        Ok(())
    }
}

fn print_counts(response: &DaemonResponse) {
    let Some(data) = response.data.as_ref() else {
        return;
    };
    if data.get("skipped").and_then(Value::as_bool) == Some(true) {
        return;
    }
    let count = |key: &str| data.get(key).and_then(Value::as_u64).unwrap_or(0);
    if let Some(window) = data.get("window") {
        println!(
            "  window:  {} → {}",
            window["start"].as_str().unwrap_or("?"),
            window["end"].as_str().unwrap_or("?")
        );
    }
    println!(
        "  fetched: {}  dropped: {}  added: {}",
        count("records_fetched"),
        count("records_dropped").to_string().yellow(),
        count("records_added").to_string().green().bold()
    );
}
