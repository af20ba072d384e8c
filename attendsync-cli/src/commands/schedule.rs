//! `attendsync schedule`: recurring sync control.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::Value;

use attendsync_daemon::DaemonRequest;

use super::{finish, home_dir, request};

#[derive(Subcommand, Debug)]
pub enum ScheduleCommand {
    /// Start the recurring sync.
    Start(ScheduleStartArgs),
    /// Stop the recurring sync. In-flight syncs finish.
    Stop,
    /// Show whether the schedule runs and when it fires next.
    Status,
}

#[derive(Args, Debug)]
pub struct ScheduleStartArgs {
    /// Cron expression (5 or 6 fields, UTC). Defaults to the configured schedule.
    #[arg(long)]
    pub cron: Option<String>,
}

pub fn run(command: ScheduleCommand) -> Result<()> {
    let home = home_dir()?;

    let response = match command {
        ScheduleCommand::Start(args) => request(
            &home,
            &DaemonRequest::ScheduleStart {
                schedule: args.cron,
            },
        )?,
        ScheduleCommand::Stop => request(&home, &DaemonRequest::ScheduleStop)?,
        ScheduleCommand::Status => {
            let response = request(&home, &DaemonRequest::ScheduleStatus)?;
            let data = response.data.clone().unwrap_or_default();
            let state = if data["running"].as_bool() == Some(true) {
                "running".green().bold()
            } else {
                "stopped".bright_black().bold()
            };
            println!("schedule: {state}");
            if let Some(expr) = data["schedule"].as_str() {
                println!("  cron:     {expr}");
            }
            if let Some(next) = data.get("next_run").and_then(Value::as_str) {
                println!("  next run: {next}");
            }
            return Ok(());
        }
    };

    finish(&response)
}
