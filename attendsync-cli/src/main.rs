//! attendsync: attendance-log sync CLI.
//!
//! # Usage
//!
//! ```text
//! attendsync init --api-url <url> --api-token <token> [--spreadsheet-id <id> --sheets-token <token>] [--memory]
//! attendsync daemon start|stop|status
//! attendsync sync [--start <time> --end <time>]
//! attendsync query --start <time> --end <time> [--criteria sync_time|logged_time] [--limit <n>] [--json]
//! attendsync schedule start [--cron <expr>]|stop|status
//! attendsync status [--json]
//! attendsync test
//! attendsync store describe|header|clear --yes
//! ```
//!
//! Times are RFC 3339 or `YYYY-MM-DD HH:MM:SS`, read as UTC.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, init::InitArgs, query::QueryArgs, schedule::ScheduleCommand,
    status::StatusArgs, store::StoreCommand, sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "attendsync",
    version,
    about = "Sync attendance logs from a remote API into a spreadsheet",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write ~/.attendsync/config.yaml if it does not exist yet.
    Init(InitArgs),

    /// Run or control the background sync daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Run one sync now: incremental by default, ranged with --start/--end.
    Sync(SyncArgs),

    /// Fetch and validate records for a window without writing them.
    Query(QueryArgs),

    /// Start, stop or inspect the recurring sync.
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommand,
    },

    /// Show daemon, watermark and last sync state.
    Status(StatusArgs),

    /// Check that the source API and the store are reachable.
    Test,

    /// Administer the store directly, without the daemon.
    Store {
        #[command(subcommand)]
        command: StoreCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Sync(args) => args.run(),
        Commands::Query(args) => args.run(),
        Commands::Schedule { command } => commands::schedule::run(command),
        Commands::Status(args) => args.run(),
        Commands::Test => commands::test::run(),
        Commands::Store { command } => commands::store::run(command),
    }
}
