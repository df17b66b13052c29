//! `bulkops rollback <checkpoint-id>`

use std::sync::Arc;

use bulkops::collaborators::LogNotifier;
use bulkops::FixedConfirmer;
use clap::Args;
use dialoguer::Confirm;
use tracing::info;

use super::Context;
use crate::error::{CliError, CliResult};

#[derive(Args, Debug, Clone)]
pub struct RollbackArgs {
    /// Checkpoint id, as listed by `bulkops checkpoints`
    pub checkpoint_id: String,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub async fn execute(args: RollbackArgs, ctx: &Context) -> CliResult<()> {
    let orchestrator = ctx.orchestrator(Arc::new(LogNotifier), Arc::new(FixedConfirmer(false)))?;

    let checkpoint = orchestrator
        .checkpoints()
        .into_iter()
        .find(|c| c.id == args.checkpoint_id)
        .ok_or_else(|| CliError::NotFound(format!("checkpoint {}", args.checkpoint_id)))?;

    if !args.yes {
        let prompt = format!(
            "Request a rollback of the {} of {} records in '{}'?",
            checkpoint.operation_type,
            checkpoint.record_count,
            checkpoint
                .target_collection_name
                .as_deref()
                .or(checkpoint.target_collection_id.as_deref())
                .unwrap_or("-")
        );
        let confirmed = tokio::task::spawn_blocking(move || {
            Confirm::new().with_prompt(prompt).default(false).interact()
        })
        .await
        .map_err(|e| CliError::Input(format!("prompt failed: {e}")))??;
        if !confirmed {
            return Err(CliError::Cancelled);
        }
    }

    let response = orchestrator.rollback(&checkpoint.id).await?;
    info!(checkpoint_id = %checkpoint.id, "rollback requested");

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        match response.restored_count {
            Some(count) => println!("Rollback accepted: {count} records restored."),
            None => println!("Rollback accepted."),
        }
        if let Some(message) = &response.message {
            println!("{message}");
        }
    }
    Ok(())
}
