//! `bulkops checkpoints` - list saved rollback checkpoints

use std::sync::Arc;

use bulkops::collaborators::LogNotifier;
use bulkops::{FixedConfirmer, RollbackCheckpoint};
use clap::Args;

use super::Context;
use crate::error::CliResult;

#[derive(Args, Debug, Clone)]
pub struct CheckpointsArgs {}

pub async fn execute(_args: CheckpointsArgs, ctx: &Context) -> CliResult<()> {
    let orchestrator = ctx.orchestrator(Arc::new(LogNotifier), Arc::new(FixedConfirmer(false)))?;
    let checkpoints = orchestrator.checkpoints();

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&checkpoints)?);
        return Ok(());
    }

    if checkpoints.is_empty() {
        println!("No rollback checkpoints saved.");
        return Ok(());
    }

    print_table(&checkpoints);
    Ok(())
}

fn print_table(checkpoints: &[RollbackCheckpoint]) {
    println!(
        "{:<46} {:<20} {:<8} {:<24} {:>8}",
        "ID", "CREATED", "TYPE", "POPULATION", "RECORDS"
    );
    println!("{}", "-".repeat(110));
    for checkpoint in checkpoints {
        let population = checkpoint
            .target_collection_name
            .as_deref()
            .or(checkpoint.target_collection_id.as_deref())
            .unwrap_or("-");
        println!(
            "{:<46} {:<20} {:<8} {:<24} {:>8}",
            checkpoint.id,
            checkpoint.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            checkpoint.operation_type.as_str(),
            truncate(population, 24),
            checkpoint.record_count
        );
    }
}

pub(crate) fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let kept: String = value.chars().take(width.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
