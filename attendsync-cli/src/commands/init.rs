//! `attendsync init`: write the config file.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use attendsync_core::config::{self, config_path_at};
use attendsync_core::{AppConfig, Criteria, StoreKind};

use super::home_dir;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Base URL of the attendance-log API.
    #[arg(long)]
    pub api_url: Option<String>,

    /// Bearer token for the attendance-log API.
    #[arg(long)]
    pub api_token: Option<String>,

    /// Which upstream timestamp windows apply to.
    #[arg(long, value_parser = parse_criteria)]
    pub criteria: Option<Criteria>,

    /// Target Google spreadsheet id.
    #[arg(long)]
    pub spreadsheet_id: Option<String>,

    /// Sheet (tab) name inside the spreadsheet.
    #[arg(long)]
    pub sheet_name: Option<String>,

    /// OAuth access token for the Sheets API.
    #[arg(long)]
    pub sheets_token: Option<String>,

    /// Keep rows in memory instead of a spreadsheet.
    #[arg(long)]
    pub memory: bool,

    /// Cron expression for the recurring sync (UTC).
    #[arg(long)]
    pub schedule: Option<String>,

    /// Hours to look back when no sync has succeeded yet.
    #[arg(long)]
    pub lookback_hours: Option<u32>,

    /// Do not start the schedule when the daemon starts.
    #[arg(long)]
    pub no_autostart: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let (config, created) =
            config::init_at(&home, self.into_config()).context("failed to initialise config")?;
        let path = config_path_at(&home);

        if created {
            println!("{} wrote {}", "✓".green().bold(), path.display());
        } else {
            println!(
                "{} config already exists at {} (left unchanged)",
                "•".yellow().bold(),
                path.display()
            );
        }
        println!("  source:   {}{}", config.source.base_url, config.source.endpoint);
        println!(
            "  store:    {}",
            match config.store.kind {
                StoreKind::Sheets =>
                    format!("sheets {} / {}", config.store.spreadsheet_id, config.store.sheet_name),
                StoreKind::Memory => "memory".to_string(),
            }
        );
        println!("  schedule: {}", config.sync.schedule);

        if let Err(err) = config.validate() {
            println!("{} {err}", "!".yellow().bold());
        }
        Ok(())
    }

    fn into_config(self) -> AppConfig {
        let mut config = AppConfig::default();
        if let Some(v) = self.api_url {
            config.source.base_url = v;
        }
        if let Some(v) = self.api_token {
            config.source.api_token = v;
        }
        if let Some(v) = self.criteria {
            config.source.criteria = v;
        }
        if let Some(v) = self.spreadsheet_id {
            config.store.spreadsheet_id = v;
        }
        if let Some(v) = self.sheet_name {
            config.store.sheet_name = v;
        }
        if let Some(v) = self.sheets_token {
            config.store.access_token = v;
        }
        if self.memory {
            config.store.kind = StoreKind::Memory;
        }
        if let Some(v) = self.schedule {
            config.sync.schedule = v;
        }
        if let Some(v) = self.lookback_hours {
            config.sync.lookback_hours = v;
        }
        config.sync.autostart = !self.no_autostart;
        config
    }
}

pub fn parse_criteria(raw: &str) -> Result<Criteria, String> {
    raw.parse()
}
