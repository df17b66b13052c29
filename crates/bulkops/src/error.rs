//! Error types for bulk operations
//!
//! `ClientError` covers the transport to the directory service. `OperationError`
//! is what the orchestrator hands back to callers; its messages are worded so
//! the error classifier can categorise them from text alone.

use thiserror::Error;

use crate::models::OperationType;

/// Result alias for orchestrator-level calls
pub type OperationResult<T> = Result<T, OperationError>;

/// Result alias for directory client calls
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised while talking to the directory service
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ClientError {
    /// True for failures of the transport itself rather than a server reply
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::Timeout(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout(e.to_string())
        } else if e.is_connect() {
            ClientError::Network(format!("connection failed: {e}"))
        } else if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}

/// Errors surfaced by the operation orchestrator
#[derive(Debug, Clone, Error)]
pub enum OperationError {
    #[error("Another operation is already running ({running}). Wait for it to finish before starting a new one.")]
    Busy { running: OperationType },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Safety checks failed:\n{}", .0.join("\n"))]
    Safety(Vec<String>),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Critical error reported in operation audit trail: {0}")]
    CriticalAuditEntry(String),

    #[error("Operation cancelled by user")]
    CancelledByUser,

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("No operation is currently running")]
    NotRunning,

    #[error("Rollback checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OperationError {
    /// Safety failures are always reported as one aggregated error
    pub fn safety<I, S>(failures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        OperationError::Safety(failures.into_iter().map(Into::into).collect())
    }

    /// True for the two cancellation variants
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            OperationError::Cancelled | OperationError::CancelledByUser
        )
    }
}

impl From<ClientError> for OperationError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Network(msg) => OperationError::Network(msg),
            ClientError::Timeout(msg) => OperationError::Network(format!("request timed out: {msg}")),
            ClientError::Api { status, message } if status == 401 || status == 403 => {
                OperationError::Authentication(format!("status {status}: {message}"))
            }
            ClientError::Api { status, message } if status >= 500 => {
                OperationError::Server(format!("status {status}: {message}"))
            }
            ClientError::Api { status, message } => {
                OperationError::Validation(format!("request rejected (status {status}): {message}"))
            }
            ClientError::Decode(msg) => {
                OperationError::Server(format!("unexpected response from server: {msg}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_message_mentions_already_running() {
        let err = OperationError::Busy {
            running: OperationType::Delete,
        };
        assert!(err.to_string().contains("already running"));
        assert!(err.to_string().contains("delete"));
    }

    #[test]
    fn test_safety_message_is_newline_joined() {
        let err = OperationError::safety(["first rule", "second rule"]);
        assert_eq!(
            err.to_string(),
            "Safety checks failed:\nfirst rule\nsecond rule"
        );
    }

    #[test]
    fn test_client_error_401_maps_to_authentication() {
        let err: OperationError = ClientError::Api {
            status: 401,
            message: "bad token".to_string(),
        }
        .into();
        assert!(matches!(err, OperationError::Authentication(_)));
    }

    #[test]
    fn test_client_error_5xx_maps_to_server() {
        let err: OperationError = ClientError::Api {
            status: 503,
            message: "unavailable".to_string(),
        }
        .into();
        assert!(matches!(err, OperationError::Server(_)));
    }

    #[test]
    fn test_client_error_4xx_maps_to_validation() {
        let err: OperationError = ClientError::Api {
            status: 422,
            message: "bad payload".to_string(),
        }
        .into();
        assert!(matches!(err, OperationError::Validation(_)));
    }

    #[test]
    fn test_transport_errors() {
        assert!(ClientError::Network("down".into()).is_transport());
        assert!(ClientError::Timeout("slow".into()).is_transport());
        assert!(!ClientError::Decode("junk".into()).is_transport());
    }
}
