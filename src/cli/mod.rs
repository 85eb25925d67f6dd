pub mod commands;
pub mod errors;
pub mod output;

use crate::config::CliArgs;
use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(
    name = "sheet-mirror",
    version,
    about = "Spreadsheet mirroring with deferred formula freeze"
)]
pub struct Cli {
    #[command(flatten)]
    pub args: CliArgs,

    #[arg(long, global = true)]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Copy source rows, restore the formula template and schedule normalization.
    Sync {
        /// Stay in the foreground until the scheduled normalization has run.
        #[arg(long)]
        wait: bool,
    },
    /// Format dates and freeze formulas now, consuming any pending trigger.
    Normalize,
    /// List pending triggers.
    Triggers,
    /// Dispatch every trigger that is already due.
    RunDue,
    /// Poll triggers (and sync periodically, when configured) until ctrl-c.
    Daemon,
}

pub async fn run_command(cli: Cli) -> Result<Value> {
    let context = commands::CommandContext::from_args(cli.args)?;
    match cli.command {
        Commands::Sync { wait } => commands::stage::sync(&context, wait).await,
        Commands::Normalize => commands::stage::normalize(&context).await,
        Commands::Triggers => commands::triggers::list(&context),
        Commands::RunDue => commands::triggers::run_due(&context).await,
        Commands::Daemon => commands::triggers::daemon(&context).await,
    }
}
