//! `bulkops import|export|delete|modify`

use std::path::PathBuf;
use std::sync::Arc;

use bulkops::collaborators::TerminalConfirmer;
use bulkops::models::ConflictPreview;
use bulkops::{Confirmer, FixedConfirmer, OperationOptions, OperationOutcome, OperationType};
use clap::Args;
use tracing::{debug, warn};

use super::Context;
use crate::error::{CliError, CliResult};
use crate::progress::TerminalNotifier;

// ============================================================================
// Command Arguments
// ============================================================================

/// Arguments shared by the four operation commands
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Target population id
    #[arg(long, short = 'p')]
    pub population: Option<String>,

    /// Target population display name
    #[arg(long)]
    pub population_name: Option<String>,

    /// Input file (CSV or JSON)
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,

    /// Number of records the run is expected to touch
    #[arg(long)]
    pub count: Option<u64>,

    /// Record filter as key=value, repeatable
    #[arg(long = "filter", value_parser = parse_filter)]
    pub filters: Vec<(String, String)>,

    /// Number of changes a modify preview expects
    #[arg(long)]
    pub expected_changes: Option<u64>,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Run checks and report what would be affected without submitting
    #[arg(long)]
    pub dry_run: bool,
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

impl RunArgs {
    pub fn to_options(&self) -> OperationOptions {
        let mut options = OperationOptions {
            population_id: self.population.clone(),
            population_name: self.population_name.clone(),
            file: self.file.clone(),
            user_count: self.count,
            confirmed: self.yes.then_some(true),
            dry_run: self.dry_run,
            ..Default::default()
        };
        for (key, value) in &self.filters {
            options
                .filters
                .insert(key.clone(), serde_json::Value::String(value.clone()));
        }
        if let Some(expected_changes) = self.expected_changes {
            options.conflict_preview = Some(ConflictPreview {
                expected_changes,
                conflicts: 0,
            });
        }
        options
    }
}

// ============================================================================
// Command Execution
// ============================================================================

fn label(op_type: OperationType) -> &'static str {
    match op_type {
        OperationType::Import => "Importing",
        OperationType::Export => "Exporting",
        OperationType::Delete => "Deleting",
        OperationType::Modify => "Modifying",
    }
}

/// Run one operation, cancelling it cleanly on Ctrl+C
pub async fn execute(op_type: OperationType, args: RunArgs, ctx: &Context) -> CliResult<()> {
    let options = args.to_options();
    let dry_run = options.dry_run || ctx.config.dry_run;

    let notifier = Arc::new(TerminalNotifier::new(label(op_type), dry_run, ctx.json));
    let confirmer: Arc<dyn Confirmer> = if args.yes {
        Arc::new(FixedConfirmer(true))
    } else {
        Arc::new(TerminalConfirmer)
    };
    let orchestrator = ctx.orchestrator(notifier, confirmer)?;

    let mut task = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.start(op_type, options).await }
    });

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received, cancelling operation");
            if let Err(e) = orchestrator.cancel().await {
                debug!(error = %e, "nothing to cancel");
            }
            task.await
        }
    };
    let outcome = joined.map_err(|e| CliError::Other(format!("operation task failed: {e}")))??;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

fn print_outcome(outcome: &OperationOutcome) {
    let op_type = outcome.op_type;
    let report = &outcome.report;

    if report.dry_run {
        println!(
            "Dry run: {op_type} would affect {} records. Nothing was submitted.",
            report.would_affect.unwrap_or(0)
        );
        return;
    }

    println!(
        "{} finished: {} records affected, {} failed.",
        capitalize(op_type.as_str()),
        report.affected(op_type),
        report.failed_count
    );
    if let Some(url) = &report.download_url {
        println!("Download: {url}");
    }
    if let Some(checkpoint_id) = &outcome.checkpoint_id {
        println!("Rollback checkpoint: {checkpoint_id}");
    }
    if let Some(session_id) = &outcome.session_id {
        println!("Session: {session_id}");
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
