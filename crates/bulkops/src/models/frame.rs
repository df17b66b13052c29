//! Progress frames delivered by the push stream and the status endpoint

use serde::{Deserialize, Deserializer, Serialize};

use super::operation::OperationReport;

/// Server-side status carried by a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

/// `{current, total, percentage, message, status, error?}` plus the final
/// report once the run completes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressFrame {
    #[serde(default)]
    pub current: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default, deserialize_with = "clamped_percentage")]
    pub percentage: u8,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: FrameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<OperationReport>,
}

/// Servers send any integer here; out-of-range values are clamped
fn clamped_percentage<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if raw.is_nan() {
        return Ok(0);
    }
    Ok(raw.clamp(0.0, 100.0).round() as u8)
}

impl ProgressFrame {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, FrameStatus::Completed | FrameStatus::Failed)
    }

    pub fn running(current: u64, total: u64, message: impl Into<String>) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((current.min(total) * 100) / total) as u8
        };
        Self {
            current,
            total,
            percentage,
            message: message.into(),
            status: FrameStatus::Running,
            error: None,
            result: None,
        }
    }

    pub fn completed(total: u64, result: OperationReport) -> Self {
        Self {
            current: total,
            total,
            percentage: 100,
            message: "Completed".to_string(),
            status: FrameStatus::Completed,
            error: None,
            result: Some(result),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            message: error.clone(),
            status: FrameStatus::Failed,
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Terminal outcome of a tracked session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalStatus {
    Completed(ProgressFrame),
    Failed(String),
}
