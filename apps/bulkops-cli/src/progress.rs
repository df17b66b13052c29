//! Terminal progress reporting
//!
//! Implements the orchestrator's [`Notifier`] with an indicatif progress bar
//! and colored messages on stderr.

use std::sync::Mutex;
use std::time::Duration;

use bulkops::{Notifier, OperationEvent, Progress};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use uuid::Uuid;

const BAR_TEMPLATE: &str = "{spinner:.green} {msg} [{bar:40.cyan/blue}] {percent:>3}%";
const DRY_RUN_TEMPLATE: &str = "{spinner:.yellow} {msg} [{bar:40.yellow/blue}] {percent:>3}%";

/// Progress bar plus error and event output for one CLI run
pub struct TerminalNotifier {
    bar: Mutex<Option<ProgressBar>>,
    label: String,
    dry_run: bool,
    /// JSON mode keeps stdout machine-readable and hides the bar
    quiet: bool,
}

impl TerminalNotifier {
    pub fn new(label: impl Into<String>, dry_run: bool, quiet: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            label: label.into(),
            dry_run,
            quiet,
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let mut slot = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        let bar = slot.get_or_insert_with(|| self.create_bar());
        f(bar);
    }

    fn create_bar(&self) -> ProgressBar {
        let bar = ProgressBar::new(100);
        if self.quiet {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }

        let template = if self.dry_run { DRY_RUN_TEMPLATE } else { BAR_TEMPLATE };
        let style = ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░");
        bar.set_style(style);

        let prefix = if self.dry_run {
            format!("(dry-run) {}", self.label)
        } else {
            self.label.clone()
        };
        bar.set_message(prefix);
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }

    fn finish(&self) {
        if let Some(bar) = self.bar.lock().unwrap_or_else(|e| e.into_inner()).take() {
            bar.finish_and_clear();
        }
    }

    fn note(&self, colored: &str, plain: &str) {
        if self.quiet {
            return;
        }
        if std::env::var("NO_COLOR").is_err() {
            eprintln!("{colored}");
        } else {
            eprintln!("{plain}");
        }
    }
}

impl Notifier for TerminalNotifier {
    fn show_error(&self, title: &str, message: &str) {
        self.finish();
        self.note(
            &format!("\x1b[31m{title}:\x1b[0m {message}"),
            &format!("{title}: {message}"),
        );
    }

    fn on_event(&self, event: &OperationEvent) {
        match event {
            // The bar appears with the first frame so it never draws over the confirmation prompt
            OperationEvent::Started { .. } => {}
            OperationEvent::Completed { outcome } => {
                self.finish();
                for warning in &outcome.warnings {
                    self.note(
                        &format!("\x1b[33mWarning:\x1b[0m {warning}"),
                        &format!("Warning: {warning}"),
                    );
                }
            }
            OperationEvent::Failed { rollback, .. } => {
                self.finish();
                if let Some(offer) = rollback {
                    let hint = format!(
                        "Checkpoint {} was saved before the {} of {} records. Run 'bulkops rollback {}' to request a rollback.",
                        offer.checkpoint_id,
                        offer.operation_type,
                        offer.record_count,
                        offer.checkpoint_id
                    );
                    self.note(&format!("\x1b[33mRecovery:\x1b[0m {hint}"), &format!("Recovery: {hint}"));
                }
            }
            OperationEvent::Cancelled { .. } => self.finish(),
        }
    }

    fn on_progress(&self, _operation_id: Uuid, progress: &Progress) {
        self.with_bar(|bar| {
            bar.set_position(u64::from(progress.percentage));
            if !progress.message.is_empty() {
                let prefix = if self.dry_run { "(dry-run) " } else { "" };
                bar.set_message(format!("{prefix}{}: {}", self.label, progress.message));
            }
        });
    }
}
