//! `bulkops audit` - show the local audit log

use std::sync::Arc;

use bulkops::collaborators::LogNotifier;
use bulkops::{AuditEntry, FixedConfirmer};
use clap::Args;

use super::checkpoints::truncate;
use super::Context;
use crate::error::{CliError, CliResult};

#[derive(Args, Debug, Clone)]
pub struct AuditArgs {
    /// Maximum number of entries to show (1-100)
    #[arg(long, short = 'l', default_value = "20")]
    pub limit: usize,
}

pub async fn execute(args: AuditArgs, ctx: &Context) -> CliResult<()> {
    if args.limit == 0 || args.limit > 100 {
        return Err(CliError::Validation(
            "Limit must be between 1 and 100".to_string(),
        ));
    }

    let orchestrator = ctx.orchestrator(Arc::new(LogNotifier), Arc::new(FixedConfirmer(false)))?;
    let entries: Vec<AuditEntry> = orchestrator.audit_log().into_iter().take(args.limit).collect();

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Audit log is empty.");
        return Ok(());
    }

    println!(
        "{:<20} {:<8} {:<10} {:<24} {:>8} {:>8}  {}",
        "TIME", "TYPE", "STATUS", "POPULATION", "RECORDS", "AFFECTED", "ERROR"
    );
    println!("{}", "-".repeat(110));
    for entry in &entries {
        let population = entry
            .target_name
            .as_deref()
            .or(entry.target_id.as_deref())
            .unwrap_or("-");
        println!(
            "{:<20} {:<8} {:<10} {:<24} {:>8} {:>8}  {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.operation.as_str(),
            entry.status.to_string(),
            truncate(population, 24),
            entry.record_count,
            entry
                .affected_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            entry.error_message.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
