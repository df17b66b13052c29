//! CLI error types and exit codes

use bulkops::{ClientError, ConfigError, OperationError};
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General error
/// - 2: Authentication required
/// - 3: Network error
/// - 4: Validation or safety error
/// - 5: Server error
/// - 130: Cancelled
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{0}")]
    Blocked(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("{0}")]
    Busy(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("{0}")]
    Other(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Authentication(_) => 2,
            CliError::Network(_) => 3,
            CliError::Validation(_) | CliError::Blocked(_) | CliError::NotFound(_) => 4,
            CliError::Server(_) => 5,
            CliError::Cancelled => 130,
            CliError::Busy(_) | CliError::Config(_) | CliError::Input(_) | CliError::Other(_) => 1,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Authentication(_) => {
                Some("Set BULKOPS_API_TOKEN or pass --token with a valid API token.")
            }
            CliError::Network(_) => {
                Some("Check that the directory service is reachable at the configured --api-url.")
            }
            CliError::Blocked(_) => Some("Run with --dry-run to see what the operation would affect."),
            CliError::NotFound(_) => Some("Run 'bulkops checkpoints' to list saved checkpoints."),
            _ => None,
        }
    }
}

impl From<OperationError> for CliError {
    fn from(e: OperationError) -> Self {
        match e {
            OperationError::Authentication(msg) => CliError::Authentication(msg),
            OperationError::Network(msg) => CliError::Network(msg),
            OperationError::Validation(msg) => CliError::Validation(msg),
            OperationError::Safety(_) => CliError::Blocked(e.to_string()),
            OperationError::Server(msg) => CliError::Server(msg),
            OperationError::CriticalAuditEntry(_) => CliError::Server(e.to_string()),
            OperationError::Busy { .. } => CliError::Busy(e.to_string()),
            OperationError::CancelledByUser | OperationError::Cancelled => CliError::Cancelled,
            OperationError::NotRunning => CliError::Other(e.to_string()),
            OperationError::CheckpointNotFound(id) => CliError::NotFound(format!("checkpoint {id}")),
            OperationError::Internal(msg) => CliError::Other(msg),
        }
    }
}

impl From<ClientError> for CliError {
    fn from(e: ClientError) -> Self {
        OperationError::from(e).into()
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Config(format!("I/O error: {}", e))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Other(format!("JSON error: {}", e))
    }
}

impl From<dialoguer::Error> for CliError {
    fn from(e: dialoguer::Error) -> Self {
        CliError::Input(format!("Dialog error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkops::OperationType;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Authentication("x".into()).exit_code(), 2);
        assert_eq!(CliError::Network("x".into()).exit_code(), 3);
        assert_eq!(CliError::Validation("x".into()).exit_code(), 4);
        assert_eq!(CliError::Server("x".into()).exit_code(), 5);
        assert_eq!(CliError::Cancelled.exit_code(), 130);
        assert_eq!(CliError::Config("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_safety_error_keeps_every_failure() {
        let err: CliError =
            OperationError::safety(["first problem", "second problem"]).into();
        let message = err.to_string();
        assert!(message.contains("first problem"));
        assert!(message.contains("second problem"));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_declined_confirmation_is_cancelled() {
        let err: CliError = OperationError::CancelledByUser.into();
        assert!(matches!(err, CliError::Cancelled));
    }

    #[test]
    fn test_busy_is_general_error() {
        let err: CliError = OperationError::Busy {
            running: OperationType::Delete,
        }
        .into();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("already running"));
    }

    #[test]
    fn test_client_unauthorized_maps_to_authentication() {
        let err: CliError = ClientError::Api {
            status: 401,
            message: "expired".into(),
        }
        .into();
        assert_eq!(err.exit_code(), 2);
    }
}
