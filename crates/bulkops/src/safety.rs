//! Safety gate for destructive operations
//!
//! Every applicable rule is evaluated and all failures are reported together
//! in one [`OperationError::Safety`], so a caller can fix everything at once.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::client::DirectoryClient;
use crate::collaborators::FileValidator;
use crate::config::OrchestratorConfig;
use crate::error::{OperationError, OperationResult};
use crate::models::{Collection, OperationOptions, OperationType};

/// Named rules the gate knows how to evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyRule {
    /// Target population must exist and be readable
    TargetExists,
    /// Reserved population names cannot be targeted
    ProtectedTarget,
    /// Input file shape, as judged by the file validator
    FileShape,
    /// Declared record count must stay under the per-type ceiling
    RecordCeiling,
}

impl SafetyRule {
    pub fn name(&self) -> &'static str {
        match self {
            SafetyRule::TargetExists => "target_exists",
            SafetyRule::ProtectedTarget => "protected_target",
            SafetyRule::FileShape => "file_shape",
            SafetyRule::RecordCeiling => "record_ceiling",
        }
    }
}

const DESTRUCTIVE_RULES: &[SafetyRule] = &[
    SafetyRule::TargetExists,
    SafetyRule::ProtectedTarget,
    SafetyRule::FileShape,
    SafetyRule::RecordCeiling,
];

/// What the gate learned while checking, for later phases
#[derive(Debug, Clone, Default)]
pub struct SafetyReport {
    /// The looked-up target, when the lookup succeeded
    pub collection: Option<Collection>,
}

impl SafetyReport {
    /// Declared count, else the target's size
    pub fn record_count(&self, options: &OperationOptions) -> Option<u64> {
        options
            .user_count
            .or_else(|| self.collection.as_ref().and_then(|c| c.user_count))
    }
}

pub struct SafetyGate {
    client: Arc<dyn DirectoryClient>,
    file_validator: Arc<dyn FileValidator>,
    protected: Vec<String>,
    max_delete_records: u64,
    max_modify_records: u64,
}

impl SafetyGate {
    pub fn new(
        config: &OrchestratorConfig,
        client: Arc<dyn DirectoryClient>,
        file_validator: Arc<dyn FileValidator>,
    ) -> Self {
        Self {
            client,
            file_validator,
            protected: config
                .protected_collections
                .iter()
                .map(|name| name.trim().to_lowercase())
                .collect(),
            max_delete_records: config.max_delete_records,
            max_modify_records: config.max_modify_records,
        }
    }

    /// Rules applied to a given operation type
    pub fn rules_for(op_type: OperationType) -> &'static [SafetyRule] {
        if op_type.is_destructive() {
            DESTRUCTIVE_RULES
        } else {
            &[]
        }
    }

    fn ceiling(&self, op_type: OperationType) -> Option<u64> {
        match op_type {
            OperationType::Delete => Some(self.max_delete_records),
            OperationType::Modify => Some(self.max_modify_records),
            OperationType::Import | OperationType::Export => None,
        }
    }

    /// Run every rule for `op_type`, failing with all violations at once
    #[instrument(skip(self, options), fields(operation_type = %op_type))]
    pub async fn check(
        &self,
        op_type: OperationType,
        options: &OperationOptions,
    ) -> OperationResult<SafetyReport> {
        let mut report = SafetyReport::default();
        let mut failures = Vec::new();

        for rule in Self::rules_for(op_type) {
            let before = failures.len();
            match rule {
                SafetyRule::TargetExists => {
                    report.collection = self.check_target(options, &mut failures).await;
                }
                SafetyRule::ProtectedTarget => {
                    self.check_protected(op_type, options, &report, &mut failures)
                }
                SafetyRule::FileShape => {
                    if let Some(file) = options.file.as_deref() {
                        failures.extend(self.file_validator.validate(file));
                    }
                }
                SafetyRule::RecordCeiling => {
                    self.check_ceiling(op_type, options, &report, &mut failures)
                }
            }
            debug!(rule = rule.name(), passed = failures.len() == before, "safety rule evaluated");
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            warn!(failures = failures.len(), "safety checks failed");
            Err(OperationError::Safety(failures))
        }
    }

    async fn check_target(
        &self,
        options: &OperationOptions,
        failures: &mut Vec<String>,
    ) -> Option<Collection> {
        let Some(id) = options.population() else {
            failures.push("A target population is required".to_string());
            return None;
        };

        match self.client.get_collection(id).await {
            Ok(collection) => Some(collection),
            Err(e) => {
                failures.push(format!("Target population '{id}' could not be verified: {e}"));
                None
            }
        }
    }

    fn check_protected(
        &self,
        op_type: OperationType,
        options: &OperationOptions,
        report: &SafetyReport,
        failures: &mut Vec<String>,
    ) {
        let candidates = [
            options.population(),
            options.population_name.as_deref(),
            report.collection.as_ref().map(|c| c.name.as_str()),
        ];

        let hit = candidates
            .into_iter()
            .flatten()
            .find(|name| self.protected.contains(&name.trim().to_lowercase()));

        if let Some(name) = hit {
            failures.push(format!(
                "Population '{name}' is protected and cannot be the target of a {op_type} operation"
            ));
        }
    }

    fn check_ceiling(
        &self,
        op_type: OperationType,
        options: &OperationOptions,
        report: &SafetyReport,
        failures: &mut Vec<String>,
    ) {
        let (Some(limit), Some(count)) = (self.ceiling(op_type), report.record_count(options))
        else {
            return;
        };

        if count > limit {
            failures.push(format!(
                "Record count {count} exceeds the maximum allowed for a single {op_type} operation ({limit})"
            ));
        }
    }
}
