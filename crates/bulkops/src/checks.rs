//! Per-type pre-checks, validators and post-checks
//!
//! Each phase has one handler per [`OperationType`], held in a
//! [`PhaseTable`] so that a missing type is a compile error rather than a
//! lookup miss.

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::collaborators::FileValidator;
use crate::error::{OperationError, OperationResult};
use crate::models::{OperationOptions, OperationReport, OperationType};

/// One handler per operation type
#[derive(Clone, Copy)]
pub struct PhaseTable<H> {
    pub import: H,
    pub export: H,
    pub delete: H,
    pub modify: H,
}

impl<H> PhaseTable<H> {
    pub fn get(&self, op_type: OperationType) -> &H {
        match op_type {
            OperationType::Import => &self.import,
            OperationType::Export => &self.export,
            OperationType::Delete => &self.delete,
            OperationType::Modify => &self.modify,
        }
    }
}

/// Inputs available to every check
pub struct CheckContext<'a> {
    pub op_type: OperationType,
    pub options: &'a OperationOptions,
    pub file_validator: &'a dyn FileValidator,
}

pub type PreCheck = fn(&CheckContext<'_>) -> OperationResult<()>;
pub type Validator = fn(&CheckContext<'_>) -> OperationResult<()>;
/// Post-checks push non-fatal findings into `warnings` and return `Err` only
/// for findings that must fail the operation
pub type PostCheck =
    fn(&CheckContext<'_>, &OperationReport, &mut Vec<String>) -> OperationResult<()>;

/// The three check tables the orchestrator runs
#[derive(Clone, Copy)]
pub struct Checks {
    pub pre: PhaseTable<PreCheck>,
    pub validate: PhaseTable<Validator>,
    pub post: PhaseTable<PostCheck>,
}

impl Default for Checks {
    fn default() -> Self {
        Self {
            pre: PhaseTable {
                import: precheck_input_file,
                export: no_precheck,
                delete: no_precheck,
                modify: no_precheck,
            },
            validate: PhaseTable {
                import: validate_import,
                export: require_population,
                delete: require_population,
                modify: validate_modify,
            },
            post: PhaseTable {
                import: postcheck_import,
                export: postcheck_export,
                delete: postcheck_delete,
                modify: postcheck_modify,
            },
        }
    }
}

// ============================================================================
// Pre-checks
// ============================================================================

fn no_precheck(_ctx: &CheckContext<'_>) -> OperationResult<()> {
    Ok(())
}

fn precheck_input_file(ctx: &CheckContext<'_>) -> OperationResult<()> {
    let Some(file) = ctx.options.file.as_deref() else {
        return Ok(());
    };

    let issues = ctx.file_validator.validate(file);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(OperationError::Validation(issues.join("; ")))
    }
}

// ============================================================================
// Validators
// ============================================================================

fn require_population(ctx: &CheckContext<'_>) -> OperationResult<()> {
    match ctx.options.population() {
        Some(_) => Ok(()),
        None => Err(OperationError::Validation(format!(
            "a target population id is required for {}",
            ctx.op_type
        ))),
    }
}

fn validate_import(ctx: &CheckContext<'_>) -> OperationResult<()> {
    if ctx.options.file.is_none() {
        return Err(OperationError::Validation(
            "an input file is required for import".to_string(),
        ));
    }
    require_population(ctx)
}

fn validate_modify(ctx: &CheckContext<'_>) -> OperationResult<()> {
    require_population(ctx)?;
    if ctx.options.file.is_none() && ctx.options.filters.is_empty() {
        return Err(OperationError::Validation(
            "modify requires an input file or at least one filter".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// Post-checks
// ============================================================================

fn postcheck_import(
    _ctx: &CheckContext<'_>,
    report: &OperationReport,
    warnings: &mut Vec<String>,
) -> OperationResult<()> {
    if report.failed_count > 0 {
        warnings.push(format!(
            "{} records could not be imported",
            report.failed_count
        ));
    }
    Ok(())
}

fn postcheck_export(
    _ctx: &CheckContext<'_>,
    report: &OperationReport,
    warnings: &mut Vec<String>,
) -> OperationResult<()> {
    if report.download_url.is_none() {
        warnings.push("export finished without a download link".to_string());
    }
    Ok(())
}

fn postcheck_delete(
    ctx: &CheckContext<'_>,
    report: &OperationReport,
    warnings: &mut Vec<String>,
) -> OperationResult<()> {
    reject_critical_entries(report)?;

    if let (Some(expected), Some(deleted)) = (ctx.options.user_count, report.deleted_count) {
        if expected != deleted {
            warnings.push(format!(
                "Deleted count {deleted} does not match the expected count {expected}"
            ));
        }
    }
    Ok(())
}

fn postcheck_modify(
    ctx: &CheckContext<'_>,
    report: &OperationReport,
    warnings: &mut Vec<String>,
) -> OperationResult<()> {
    reject_critical_entries(report)?;

    let Some(preview) = ctx.options.conflict_preview.as_ref() else {
        return Ok(());
    };

    let modified = report.affected(OperationType::Modify);
    if modified != preview.expected_changes {
        warnings.push(format!(
            "Modified count {modified} does not match the previewed {} changes",
            preview.expected_changes
        ));
    }
    if let Some(conflicts) = report.conflict_count {
        if conflicts > preview.conflicts {
            warnings.push(format!(
                "{conflicts} conflicts reported, {} expected from the preview",
                preview.conflicts
            ));
        }
    }
    Ok(())
}

fn reject_critical_entries(report: &OperationReport) -> OperationResult<()> {
    let critical: Vec<&str> = report
        .audit_trail
        .iter()
        .filter(|entry| entry.is_critical_error())
        .map(|entry| entry.message.as_str())
        .collect();

    if critical.is_empty() {
        Ok(())
    } else {
        warn!(count = critical.len(), "critical entries in server audit trail");
        Err(OperationError::CriticalAuditEntry(critical.join("; ")))
    }
}

// ============================================================================
// Payload assembly
// ============================================================================

/// Build the JSON body for `POST /api/{type}`
pub fn build_payload(op_type: OperationType, options: &OperationOptions) -> Value {
    let mut body = Map::new();

    if let Some(id) = options.population() {
        body.insert("populationId".into(), json!(id));
    }
    if let Some(name) = options.population_name.as_deref() {
        body.insert("populationName".into(), json!(name));
    }
    if let Some(file) = options.file.as_deref() {
        if let Some(name) = file.file_name().and_then(|n| n.to_str()) {
            body.insert("fileName".into(), json!(name));
        }
        body.insert("filePath".into(), json!(file.display().to_string()));
    }
    if let Some(count) = options.user_count {
        body.insert("userCount".into(), json!(count));
    }
    if !options.filters.is_empty() {
        body.insert("filters".into(), json!(options.filters));
    }
    for (flag, enabled) in &options.flags {
        body.insert(flag.clone(), json!(enabled));
    }

    match op_type {
        OperationType::Delete => {
            body.insert("confirmDeletion".into(), json!(true));
        }
        OperationType::Modify => {
            if let Some(preview) = options.conflict_preview.as_ref() {
                body.insert("conflictPreview".into(), json!(preview));
            }
        }
        OperationType::Import | OperationType::Export => {}
    }

    Value::Object(body)
}
