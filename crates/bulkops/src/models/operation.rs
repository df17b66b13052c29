//! Operation record, options and outcome types

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::frame::ProgressFrame;

/// Kind of bulk operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Import,
    Export,
    Delete,
    Modify,
}

impl OperationType {
    /// Every operation type, in declaration order
    pub const ALL: [OperationType; 4] = [
        OperationType::Import,
        OperationType::Export,
        OperationType::Delete,
        OperationType::Modify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Import => "import",
            OperationType::Export => "export",
            OperationType::Delete => "delete",
            OperationType::Modify => "modify",
        }
    }

    /// Delete and Modify change existing records and go through the
    /// confirmation and checkpoint sub-phases.
    pub fn is_destructive(&self) -> bool {
        matches!(self, OperationType::Delete | OperationType::Modify)
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "import" => Ok(OperationType::Import),
            "export" => Ok(OperationType::Export),
            "delete" => Ok(OperationType::Delete),
            "modify" => Ok(OperationType::Modify),
            _ => Err(format!("Unknown operation type: {s}")),
        }
    }
}

/// Lifecycle status of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Initializing,
    PreflightChecking,
    Validating,
    Executing,
    Monitoring,
    PostValidating,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Initializing => "initializing",
            OperationStatus::PreflightChecking => "preflight_checking",
            OperationStatus::Validating => "validating",
            OperationStatus::Executing => "executing",
            OperationStatus::Monitoring => "monitoring",
            OperationStatus::PostValidating => "post_validating",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress of an operation, updated from progress frames
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
    pub percentage: u8,
    pub message: String,
}

impl Progress {
    /// Apply a frame, never letting the percentage go backwards
    pub fn apply(&mut self, frame: &ProgressFrame) {
        self.current = frame.current;
        self.total = frame.total;
        self.percentage = self.percentage.max(frame.percentage.min(100));
        self.message = frame.message.clone();
    }

    /// Percentage derived from the processed count rather than the high-water mark
    pub fn partial_percentage(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.current.min(self.total) * 100) / self.total) as u8
    }
}

/// Preview of a modify run, computed by the caller before submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictPreview {
    /// Records the preview expects to change
    pub expected_changes: u64,
    /// Conflicts the preview already knows about
    #[serde(default)]
    pub conflicts: u64,
}

/// Caller-supplied parameters for an operation
///
/// Only the named fields are read by the orchestrator; everything else the
/// directory service needs travels in `filters` and `flags`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOptions {
    /// Target population (collection) id
    #[serde(default)]
    pub population_id: Option<String>,
    /// Display name of the target population, if known
    #[serde(default)]
    pub population_name: Option<String>,
    /// Input file for import, delete and modify runs
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Declared number of records the run will touch
    #[serde(default)]
    pub user_count: Option<u64>,
    /// `Some(true)` pre-confirms, `Some(false)` declines, `None` asks
    #[serde(default, alias = "confirmDeletion")]
    pub confirmed: Option<bool>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub conflict_preview: Option<ConflictPreview>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub filters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
}

impl OperationOptions {
    pub fn for_population(population_id: impl Into<String>) -> Self {
        Self {
            population_id: Some(population_id.into()),
            ..Default::default()
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_user_count(mut self, count: u64) -> Self {
        self.user_count = Some(count);
        self
    }

    pub fn with_population_name(mut self, name: impl Into<String>) -> Self {
        self.population_name = Some(name.into());
        self
    }

    pub fn confirmed(mut self, confirmed: bool) -> Self {
        self.confirmed = Some(confirmed);
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_conflict_preview(mut self, preview: ConflictPreview) -> Self {
        self.conflict_preview = Some(preview);
        self
    }

    /// Population id with surrounding whitespace removed, if non-empty
    pub fn population(&self) -> Option<&str> {
        self.population_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Human-readable target, falling back to the id
    pub fn target_label(&self) -> String {
        self.population_name
            .clone()
            .or_else(|| self.population().map(String::from))
            .unwrap_or_else(|| "<unspecified>".to_string())
    }
}

/// One line of the server-side audit trail attached to a result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrailEntry {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub critical: bool,
}

impl AuditTrailEntry {
    /// Entries flagged both error-level and critical abort the operation
    pub fn is_critical_error(&self) -> bool {
        self.critical && self.level.eq_ignore_ascii_case("error")
    }
}

/// Result reported by the directory service for a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationReport {
    #[serde(default)]
    pub processed: u64,
    #[serde(default)]
    pub imported_count: Option<u64>,
    #[serde(default)]
    pub exported_count: Option<u64>,
    #[serde(default)]
    pub deleted_count: Option<u64>,
    #[serde(default)]
    pub modified_count: Option<u64>,
    #[serde(default)]
    pub conflict_count: Option<u64>,
    #[serde(default)]
    pub failed_count: u64,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub audit_trail: Vec<AuditTrailEntry>,
    /// Set when the run was a dry run and nothing was submitted
    #[serde(default)]
    pub dry_run: bool,
    /// Would-be-affected count for dry runs
    #[serde(default)]
    pub would_affect: Option<u64>,
}

impl OperationReport {
    /// Number of records the run changed for the given type
    pub fn affected(&self, op_type: OperationType) -> u64 {
        let count = match op_type {
            OperationType::Import => self.imported_count,
            OperationType::Export => self.exported_count,
            OperationType::Delete => self.deleted_count,
            OperationType::Modify => self.modified_count,
        };
        count.unwrap_or(self.processed)
    }

    pub fn dry_run(would_affect: u64) -> Self {
        Self {
            dry_run: true,
            would_affect: Some(would_affect),
            ..Default::default()
        }
    }
}

/// One bulk operation from creation to its terminal status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub op_type: OperationType,
    pub options: OperationOptions,
    pub status: OperationStatus,
    pub progress: Progress,
    pub session_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub result: Option<OperationReport>,
    pub error: Option<String>,
}

impl Operation {
    pub fn new(op_type: OperationType, options: OperationOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            op_type,
            options,
            status: OperationStatus::Initializing,
            progress: Progress::default(),
            session_id: None,
            start_time: Some(Utc::now()),
            end_time: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// What a successful `start` returns to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub operation_id: Uuid,
    pub op_type: OperationType,
    pub session_id: Option<String>,
    pub report: OperationReport,
    /// Non-fatal post-check findings
    pub warnings: Vec<String>,
    pub checkpoint_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::FrameStatus;

    fn frame(current: u64, total: u64, percentage: u8) -> ProgressFrame {
        ProgressFrame {
            current,
            total,
            percentage,
            message: format!("{current}/{total}"),
            status: FrameStatus::Running,
            error: None,
            result: None,
        }
    }

    #[test]
    fn test_operation_type_round_trip_from_str() {
        for op in OperationType::ALL {
            assert_eq!(op.as_str().parse::<OperationType>().unwrap(), op);
        }
        assert!("purge".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_destructive_types() {
        assert!(OperationType::Delete.is_destructive());
        assert!(OperationType::Modify.is_destructive());
        assert!(!OperationType::Import.is_destructive());
        assert!(!OperationType::Export.is_destructive());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OperationStatus::Completed.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
        assert!(!OperationStatus::Monitoring.is_terminal());
    }

    #[test]
    fn test_progress_never_goes_backwards() {
        let mut progress = Progress::default();
        progress.apply(&frame(5, 10, 50));
        progress.apply(&frame(4, 10, 40));
        assert_eq!(progress.percentage, 50);
        assert_eq!(progress.current, 4);
    }

    #[test]
    fn test_partial_percentage() {
        let mut progress = Progress::default();
        progress.apply(&frame(3, 12, 90));
        assert_eq!(progress.partial_percentage(), 25);
    }

    #[test]
    fn test_options_accept_confirm_deletion_alias() {
        let options: OperationOptions =
            serde_json::from_str(r#"{"populationId":"p1","confirmDeletion":false,"userCount":3}"#)
                .unwrap();
        assert_eq!(options.confirmed, Some(false));
        assert_eq!(options.user_count, Some(3));
        assert_eq!(options.population(), Some("p1"));
    }

    #[test]
    fn test_blank_population_is_none() {
        let options = OperationOptions::for_population("   ");
        assert!(options.population().is_none());
    }

    #[test]
    fn test_report_affected_falls_back_to_processed() {
        let report = OperationReport {
            processed: 7,
            deleted_count: Some(5),
            ..Default::default()
        };
        assert_eq!(report.affected(OperationType::Delete), 5);
        assert_eq!(report.affected(OperationType::Import), 7);
    }

    #[test]
    fn test_critical_audit_entry_detection() {
        let entry = AuditTrailEntry {
            level: "ERROR".to_string(),
            message: "partial write".to_string(),
            critical: true,
        };
        assert!(entry.is_critical_error());

        let warning = AuditTrailEntry {
            level: "warn".to_string(),
            critical: true,
            ..Default::default()
        };
        assert!(!warning.is_critical_error());
    }
}
