//! Rollback checkpoint records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::operation::OperationType;

/// Recovery reference captured before a destructive call
///
/// This is not a backup of the data, only enough context for an explicit
/// rollback request against the directory service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackCheckpoint {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub operation_type: OperationType,
    pub target_collection_id: Option<String>,
    pub target_collection_name: Option<String>,
    pub record_count: u64,
    pub created_by: String,
    /// Set when the checkpoint could not be persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RollbackCheckpoint {
    /// A placeholder returned when the store failed
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}
