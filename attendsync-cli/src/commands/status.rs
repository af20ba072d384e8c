//! `attendsync status`: daemon, watermark and last sync state.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use attendsync_core::SyncResult;
use attendsync_daemon::DaemonRequest;

use super::{home_dir, request};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit JSON instead of formatted output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct LastResultRow {
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Started")]
    started_at: String,
    #[tabled(rename = "Fetched")]
    fetched: usize,
    #[tabled(rename = "Dropped")]
    dropped: usize,
    #[tabled(rename = "Added")]
    added: usize,
    #[tabled(rename = "ms")]
    duration_ms: u64,
}

impl From<&SyncResult> for LastResultRow {
    fn from(result: &SyncResult) -> Self {
        Self {
            mode: result.mode.to_string(),
            outcome: match result.error {
                None => "ok".green().to_string(),
                Some(kind) => kind.to_string().red().to_string(),
            },
            started_at: result.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            fetched: result.records_fetched,
            dropped: result.records_dropped,
            added: result.records_added,
            duration_ms: result.duration_ms,
        }
    }
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let response = request(&home, &DaemonRequest::Status)?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&response).context("failed to render status JSON")?
            );
            return Ok(());
        }

        let data = response.data.unwrap_or_default();
        let syncing = data["syncing"].as_bool() == Some(true);
        println!(
            "{} daemon pid {} ({})",
            "■".green().bold(),
            data["pid"],
            if syncing {
                "syncing".yellow().bold()
            } else {
                "idle".normal()
            }
        );
        println!(
            "  watermark: {}",
            data["watermark"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!(
                    "none (first sync looks back {}h)",
                    data["lookback_hours"]
                ))
        );
        println!("  criteria:  {}", data["criteria"].as_str().unwrap_or("?"));

        let schedule = &data["schedule"];
        if schedule["running"].as_bool() == Some(true) {
            println!(
                "  schedule:  {} {} (next {})",
                "running".green(),
                schedule["expression"].as_str().unwrap_or("?"),
                schedule["next_run"].as_str().unwrap_or("never")
            );
        } else {
            println!("  schedule:  {}", "stopped".bright_black());
        }

        match data.get("last_result").filter(|v| !v.is_null()) {
            Some(value) => {
                let result: SyncResult = serde_json::from_value(Value::clone(value))
                    .context("malformed last result")?;
                let mut table = Table::new([LastResultRow::from(&result)]);
                table.with(Style::rounded());
                println!("{table}");
                if !result.success {
                    println!("{} {}", "!".red().bold(), result.message);
                }
            }
            None => println!("  last sync: {}", "never".bright_black()),
        }
        Ok(())
    }
}
