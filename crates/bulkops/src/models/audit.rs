//! Audit log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::operation::OperationType;

/// Stage of the operation an audit entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Started,
    Completed,
    Failed,
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditStatus::Started => write!(f, "started"),
            AuditStatus::Completed => write!(f, "completed"),
            AuditStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Immutable record of an operation's start or outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub operation: OperationType,
    pub status: AuditStatus,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
    pub record_count: u64,
    pub affected_count: Option<u64>,
    pub error_message: Option<String>,
    pub rollback_checkpoint_id: Option<String>,
}

impl AuditEntry {
    pub fn new(operation: OperationType, status: AuditStatus) -> Self {
        Self {
            session_id: None,
            timestamp: Utc::now(),
            operation,
            status,
            target_id: None,
            target_name: None,
            record_count: 0,
            affected_count: None,
            error_message: None,
            rollback_checkpoint_id: None,
        }
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_target(mut self, id: Option<String>, name: Option<String>) -> Self {
        self.target_id = id;
        self.target_name = name;
        self
    }

    pub fn with_record_count(mut self, count: u64) -> Self {
        self.record_count = count;
        self
    }

    pub fn with_affected(mut self, count: u64) -> Self {
        self.affected_count = Some(count);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_checkpoint(mut self, checkpoint_id: Option<String>) -> Self {
        self.rollback_checkpoint_id = checkpoint_id;
        self
    }
}
