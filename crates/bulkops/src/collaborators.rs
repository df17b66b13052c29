//! Narrow capability interfaces the orchestrator depends on
//!
//! Token management, user confirmation, notifications and input-file checks
//! live outside the orchestrator. It only sees them through these traits, so
//! callers can plug in a UI, a CLI or test doubles.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::classifier::ErrorCategory;
use crate::models::{OperationOutcome, OperationType, Progress, RollbackCheckpoint};

// ============================================================================
// Token validation
// ============================================================================

/// Checks that the caller's session token is still usable
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// `Err` carries a human-readable reason
    async fn validate(&self) -> Result<(), String>;

    /// Ask the token manager for a fresh token after an authentication failure
    fn request_refresh(&self) {
        info!("token refresh requested");
    }
}

/// Validator for a fixed bearer token
#[derive(Debug, Clone)]
pub struct StaticTokenValidator {
    token: Option<String>,
}

impl StaticTokenValidator {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self) -> Result<(), String> {
        match self.token.as_deref() {
            Some(t) if !t.trim().is_empty() => Ok(()),
            _ => Err("Not logged in: no API token configured".to_string()),
        }
    }
}

/// Validator for a token with a known expiry
#[derive(Debug, Clone)]
pub struct ExpiringTokenValidator {
    expires_at: DateTime<Utc>,
    buffer: Duration,
}

impl ExpiringTokenValidator {
    /// Tokens within five minutes of expiry are treated as expired
    pub fn new(expires_at: DateTime<Utc>) -> Self {
        Self {
            expires_at,
            buffer: Duration::minutes(5),
        }
    }
}

#[async_trait]
impl TokenValidator for ExpiringTokenValidator {
    async fn validate(&self) -> Result<(), String> {
        if self.expires_at <= Utc::now() + self.buffer {
            Err(format!(
                "Token expired or about to expire (expires at {})",
                self.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
            ))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Confirmation
// ============================================================================

/// Asks the user to approve a destructive run
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, title: &str, message: &str) -> bool;
}

/// Synchronous yes/no prompt on the controlling terminal
///
/// Used when no confirmation collaborator is supplied. A prompt that cannot
/// be shown (no TTY) counts as a refusal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalConfirmer;

#[async_trait]
impl Confirmer for TerminalConfirmer {
    async fn confirm(&self, title: &str, message: &str) -> bool {
        let prompt = format!("{title}\n{message}\nProceed?");
        let answer = tokio::task::spawn_blocking(move || {
            dialoguer::Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(confirmed)) => confirmed,
            Ok(Err(e)) => {
                warn!(error = %e, "confirmation prompt unavailable, treating as declined");
                false
            }
            Err(e) => {
                warn!(error = %e, "confirmation prompt task failed, treating as declined");
                false
            }
        }
    }
}

/// Confirmer with a fixed answer (`--yes`, tests)
#[derive(Debug, Clone, Copy)]
pub struct FixedConfirmer(pub bool);

#[async_trait]
impl Confirmer for FixedConfirmer {
    async fn confirm(&self, _title: &str, _message: &str) -> bool {
        self.0
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// Rollback recovery offered after a partial failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackOffer {
    pub checkpoint_id: String,
    pub operation_type: OperationType,
    pub target_collection_id: Option<String>,
    pub record_count: u64,
}

impl From<&RollbackCheckpoint> for RollbackOffer {
    fn from(checkpoint: &RollbackCheckpoint) -> Self {
        Self {
            checkpoint_id: checkpoint.id.clone(),
            operation_type: checkpoint.operation_type,
            target_collection_id: checkpoint.target_collection_id.clone(),
            record_count: checkpoint.record_count,
        }
    }
}

/// Lifecycle events emitted by the orchestrator
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OperationEvent {
    Started {
        operation_id: Uuid,
        op_type: OperationType,
    },
    Completed {
        outcome: OperationOutcome,
    },
    Failed {
        operation_id: Uuid,
        op_type: OperationType,
        category: ErrorCategory,
        message: String,
        rollback: Option<RollbackOffer>,
    },
    Cancelled {
        operation_id: Uuid,
        op_type: OperationType,
    },
}

/// User-facing notification sink
pub trait Notifier: Send + Sync {
    /// Shown once per terminal failure
    fn show_error(&self, title: &str, message: &str);

    fn on_event(&self, _event: &OperationEvent) {}

    fn on_progress(&self, _operation_id: Uuid, _progress: &Progress) {}
}

/// Notifier that only writes to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show_error(&self, title: &str, message: &str) {
        warn!(title, detail = message, "operation error");
    }

    fn on_event(&self, event: &OperationEvent) {
        match event {
            OperationEvent::Started { operation_id, op_type } => {
                info!(%operation_id, %op_type, "operation started")
            }
            OperationEvent::Completed { outcome } => info!(
                operation_id = %outcome.operation_id,
                op_type = %outcome.op_type,
                warnings = outcome.warnings.len(),
                "operation completed"
            ),
            OperationEvent::Failed {
                operation_id,
                category,
                rollback,
                ..
            } => info!(
                %operation_id,
                %category,
                rollback_offered = rollback.is_some(),
                "operation failed"
            ),
            OperationEvent::Cancelled { operation_id, .. } => {
                info!(%operation_id, "operation cancelled")
            }
        }
    }
}

// ============================================================================
// Input file checks
// ============================================================================

/// Shape check for input files; content parsing lives elsewhere
pub trait FileValidator: Send + Sync {
    /// Every problem found, verbatim; empty when the file is acceptable
    fn validate(&self, path: &Path) -> Vec<String>;
}

/// Extension and size checks on CSV/JSON input files
#[derive(Debug, Clone)]
pub struct BasicFileValidator {
    max_bytes: u64,
}

impl BasicFileValidator {
    pub const ALLOWED_EXTENSIONS: &'static [&'static str] = &["csv", "json"];

    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

impl FileValidator for BasicFileValidator {
    fn validate(&self, path: &Path) -> Vec<String> {
        let mut issues = Vec::new();

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !Self::ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            issues.push(format!(
                "File '{}' must be a CSV or JSON file",
                path.display()
            ));
        }

        match std::fs::metadata(path) {
            Ok(meta) if !meta.is_file() => {
                issues.push(format!("'{}' is not a regular file", path.display()));
            }
            Ok(meta) if meta.len() == 0 => {
                issues.push(format!("File '{}' is empty", path.display()));
            }
            Ok(meta) if meta.len() > self.max_bytes => {
                issues.push(format!(
                    "File '{}' is {} bytes, which exceeds the maximum allowed size of {} bytes",
                    path.display(),
                    meta.len(),
                    self.max_bytes
                ));
            }
            Ok(_) => {}
            Err(e) => {
                issues.push(format!("File '{}' cannot be read: {}", path.display(), e));
            }
        }

        issues
    }
}
