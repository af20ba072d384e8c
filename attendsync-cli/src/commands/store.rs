//! `attendsync store`: direct store administration.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use attendsync_core::config;
use attendsync_sync::{ensure_header, store, RecordStore};

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum StoreCommand {
    /// Show the store backend, title and sheets.
    Describe,
    /// Write the header row if the sheet has none.
    Header,
    /// Delete every data row, keeping the header.
    Clear(ClearArgs),
}

#[derive(Args, Debug)]
pub struct ClearArgs {
    /// Confirm the deletion.
    #[arg(long)]
    pub yes: bool,
}

pub fn run(command: StoreCommand) -> Result<()> {
    let home = home_dir()?;
    let mut config = config::load_at(&home).context("failed to load config")?;
    config
        .apply_env()
        .context("failed to apply environment overrides")?;
    let backend = store::open(&config.store);

    match command {
        StoreCommand::Describe => {
            let info = backend.describe().context("failed to describe store")?;
            println!("{} {} ({})", "■".green().bold(), info.title.bold(), info.backend);
            println!("  id:     {}", info.id);
            println!("  sheets: {}", info.sheets.join(", "));
            let rows = backend.read_keys().context("failed to read keys")?.len();
            println!("  rows:   {rows}");
        }
        StoreCommand::Header => {
            if ensure_header(backend.as_ref()).context("failed to write header")? {
                println!("{} header row written", "✓".green().bold());
            } else {
                println!("header row already present");
            }
        }
        StoreCommand::Clear(args) => {
            if !args.yes {
                bail!("refusing to clear the store without --yes");
            }
            backend.clear().context("failed to clear store")?;
            println!("{} data rows cleared", "✓".green().bold());
        }
    }
    Ok(())
}
