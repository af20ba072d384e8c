//! `attendsync query`: preview records for a window.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use attendsync_core::{AttendanceRecord, Criteria};
use attendsync_daemon::DaemonRequest;

use super::init::parse_criteria;
use super::{ensure_ordered, home_dir, parse_time, request};

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[arg(long, value_parser = parse_time)]
    pub start: DateTime<Utc>,

    #[arg(long, value_parser = parse_time)]
    pub end: DateTime<Utc>,

    /// Override the configured timestamp criteria.
    #[arg(long, value_parser = parse_criteria)]
    pub criteria: Option<Criteria>,

    /// Show at most this many records.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Emit JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "UID")]
    uid: String,
    #[tabled(rename = "Logged")]
    logged_time: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Person")]
    person: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Location")]
    location: String,
}

impl From<&AttendanceRecord> for RecordRow {
    fn from(record: &AttendanceRecord) -> Self {
        Self {
            uid: record.uid.clone(),
            logged_time: record.logged_time.clone(),
            kind: record.kind.to_string(),
            person: if record.primary_display_text.is_empty() {
                record.person_id.clone()
            } else {
                record.primary_display_text.clone()
            },
            device: record.device_id.clone(),
            location: record.location.clone(),
        }
    }
}

impl QueryArgs {
    pub fn run(self) -> Result<()> {
        ensure_ordered(self.start, self.end)?;

        let home = home_dir()?;
        let response = request(
            &home,
            &DaemonRequest::Query {
                start: self.start,
                end: self.end,
                criteria: self.criteria,
                limit: self.limit,
            },
        )?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        if !response.success {
            match response.error.as_deref() {
                Some(kind) => bail!("{kind}: {}", response.message),
                None => bail!("{}", response.message),
            }
        }
        if self.json {
            return Ok(());
        }

        let data = response.data.unwrap_or_default();
        let records: Vec<AttendanceRecord> =
            serde_json::from_value(data["records"].clone()).context("malformed query records")?;

        println!("{}", response.message.bold());
        if data["dropped"].as_u64().unwrap_or(0) > 0 {
            println!(
                "{} {} record(s) failed validation",
                "!".yellow().bold(),
                data["dropped"]
            );
        }
        if records.is_empty() {
            return Ok(());
        }
        let mut table = Table::new(records.iter().map(RecordRow::from));
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
