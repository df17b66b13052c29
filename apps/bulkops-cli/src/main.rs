//! bulkops - guarded bulk operations against a directory service
//!
//! Imports, exports, deletes and modifies users in a population with
//! preflight checks, a safety gate for destructive runs, rollback
//! checkpoints and a local audit log.

use clap::{Parser, Subcommand};

mod commands;
mod error;
mod logging;
mod paths;
mod progress;

use bulkops::OperationType;
use commands::audit::AuditArgs;
use commands::checkpoints::CheckpointsArgs;
use commands::rollback::RollbackArgs;
use commands::run::RunArgs;
use commands::{Context, GlobalArgs};
use error::CliResult;

/// bulkops - bulk identity operations
#[derive(Parser)]
#[command(name = "bulkops")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import users from a file into a population
    Import(RunArgs),

    /// Export the users of a population
    Export(RunArgs),

    /// Delete users from a population
    Delete(RunArgs),

    /// Modify users in a population
    Modify(RunArgs),

    /// List saved rollback checkpoints
    Checkpoints(CheckpointsArgs),

    /// Show the local audit log
    Audit(AuditArgs),

    /// Request a rollback to a saved checkpoint
    Rollback(RollbackArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = run(cli).await;

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    logging::init_logging(&cli.global.log_level, cli.global.log_json)?;
    let ctx = Context::load(&cli.global)?;

    match cli.command {
        Commands::Import(args) => commands::run::execute(OperationType::Import, args, &ctx).await,
        Commands::Export(args) => commands::run::execute(OperationType::Export, args, &ctx).await,
        Commands::Delete(args) => commands::run::execute(OperationType::Delete, args, &ctx).await,
        Commands::Modify(args) => commands::run::execute(OperationType::Modify, args, &ctx).await,
        Commands::Checkpoints(args) => commands::checkpoints::execute(args, &ctx).await,
        Commands::Audit(args) => commands::audit::execute(args, &ctx).await,
        Commands::Rollback(args) => commands::rollback::execute(args, &ctx).await,
    }
}
