//! Error classification
//!
//! Maps an error to a category and a recovery hint. Typed errors carry their
//! category; raw messages are matched by lower-cased substring against an
//! ordered rule table where the first match wins. Anything unmatched is
//! `Unknown`, so classification is total.

use serde::{Deserialize, Serialize};

use crate::error::OperationError;

/// Broad failure category used to pick a message template and recovery path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Authentication,
    Validation,
    Safety,
    Server,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Safety => "safety",
            ErrorCategory::Server => "server",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the caller should do about a classified failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryHint {
    /// Dialog title
    pub title: &'static str,
    /// User-facing message template
    pub message: &'static str,
    /// Whether a checkpoint-based rollback should be offered
    pub offer_rollback: bool,
    /// Whether the token manager should be asked for a fresh token
    pub refresh_token: bool,
}

/// Category plus recovery hint for one error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: ErrorCategory,
    pub hint: RecoveryHint,
}

const AUTHENTICATION_PATTERNS: &[&str] = &[
    "authentication",
    "unauthorized",
    "unauthorised",
    "forbidden",
    "token",
    "status 401",
    "status 403",
    "not logged in",
    "credentials",
];

const NETWORK_PATTERNS: &[&str] = &[
    "network",
    "connection",
    "timed out",
    "timeout",
    "unreachable",
    "dns",
    "econnrefused",
    "socket",
    "fetch",
];

const SAFETY_PATTERNS: &[&str] = &[
    "safety",
    "protected",
    "exceeds",
    "maximum allowed",
    "cancelled by user",
    "not allowed",
];

const VALIDATION_PATTERNS: &[&str] = &[
    "validation",
    "invalid",
    "required",
    "missing",
    "must ",
    "rejected",
];

const SERVER_PATTERNS: &[&str] = &[
    "server error",
    "internal",
    "status 500",
    "status 502",
    "status 503",
    "status 504",
    "service unavailable",
    "bad gateway",
    "unexpected response",
    "critical error",
];

/// Ordered rule table: authentication outranks network so that
/// "token request timed out" is treated as an auth problem.
const RULES: &[(ErrorCategory, &[&str])] = &[
    (ErrorCategory::Authentication, AUTHENTICATION_PATTERNS),
    (ErrorCategory::Network, NETWORK_PATTERNS),
    (ErrorCategory::Safety, SAFETY_PATTERNS),
    (ErrorCategory::Validation, VALIDATION_PATTERNS),
    (ErrorCategory::Server, SERVER_PATTERNS),
];

/// Classify a raw error message
pub fn classify_message(message: &str) -> Classification {
    let lowered = message.to_lowercase();
    let category = RULES
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lowered.contains(p)))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Unknown);

    Classification {
        category,
        hint: hint_for(category),
    }
}

/// Classify an orchestrator error
///
/// Typed variants map straight to their category, so words quoted from a
/// server message cannot reclassify them. Only untyped errors fall back to
/// message matching.
pub fn classify(error: &OperationError) -> Classification {
    let category = match error {
        OperationError::Safety(_) | OperationError::CancelledByUser => ErrorCategory::Safety,
        OperationError::Authentication(_) => ErrorCategory::Authentication,
        OperationError::Network(_) => ErrorCategory::Network,
        OperationError::Validation(_) => ErrorCategory::Validation,
        OperationError::Server(_) | OperationError::CriticalAuditEntry(_) => {
            ErrorCategory::Server
        }
        _ => return classify_message(&error.to_string()),
    };

    Classification {
        category,
        hint: hint_for(category),
    }
}

/// Fixed recovery hint per category
pub fn hint_for(category: ErrorCategory) -> RecoveryHint {
    match category {
        ErrorCategory::Network => RecoveryHint {
            title: "Connection Problem",
            message: "The directory service could not be reached. Check your connection; if the operation had already started, some records may have been changed.",
            offer_rollback: true,
            refresh_token: false,
        },
        ErrorCategory::Authentication => RecoveryHint {
            title: "Authentication Required",
            message: "Your session is no longer valid. Sign in again and retry the operation.",
            offer_rollback: false,
            refresh_token: true,
        },
        ErrorCategory::Validation => RecoveryHint {
            title: "Invalid Request",
            message: "The operation was rejected because its input is invalid. Correct the highlighted fields and try again.",
            offer_rollback: false,
            refresh_token: false,
        },
        ErrorCategory::Safety => RecoveryHint {
            title: "Operation Blocked",
            message: "The operation was blocked by a safety check before any records were changed.",
            offer_rollback: false,
            refresh_token: false,
        },
        ErrorCategory::Server => RecoveryHint {
            title: "Server Error",
            message: "The directory service reported an error. Some records may have been changed; review the audit log and consider a rollback.",
            offer_rollback: true,
            refresh_token: false,
        },
        ErrorCategory::Unknown => RecoveryHint {
            title: "Operation Failed",
            message: "The operation failed for an unexpected reason. Review the audit log before retrying.",
            offer_rollback: true,
            refresh_token: false,
        },
    }
}

/// Render the user-facing message, appending raw detail only when asked
pub fn user_message(classification: &Classification, raw: &str, show_details: bool) -> String {
    if show_details {
        format!("{}\n\nDetails: {}", classification.hint.message, raw)
    } else {
        classification.hint.message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_messages() {
        for msg in [
            "Network error: connection refused",
            "Request timed out after 30s",
            "host unreachable",
            "Failed to fetch",
        ] {
            assert_eq!(classify_message(msg).category, ErrorCategory::Network, "{msg}");
        }
    }

    #[test]
    fn test_authentication_messages() {
        for msg in [
            "Authentication failed: status 401: expired",
            "Token expired",
            "403 Forbidden",
        ] {
            assert_eq!(
                classify_message(msg).category,
                ErrorCategory::Authentication,
                "{msg}"
            );
        }
    }

    #[test]
    fn test_authentication_outranks_network() {
        let c = classify_message("token refresh request timed out");
        assert_eq!(c.category, ErrorCategory::Authentication);
        assert!(c.hint.refresh_token);
    }

    #[test]
    fn test_validation_messages() {
        assert_eq!(
            classify_message("Validation failed: population id is required").category,
            ErrorCategory::Validation
        );
        assert_eq!(
            classify_message("Invalid CSV header").category,
            ErrorCategory::Validation
        );
    }

    #[test]
    fn test_safety_messages() {
        let err = OperationError::safety([
            "Record count 1500 exceeds the maximum allowed for delete (1000)",
        ]);
        assert_eq!(classify(&err).category, ErrorCategory::Safety);
        assert_eq!(
            classify(&OperationError::CancelledByUser).category,
            ErrorCategory::Safety
        );
    }

    #[test]
    fn test_safety_error_quoting_a_lookup_failure_stays_safety() {
        let err = OperationError::safety([
            "Target population 'pop-1' could not be verified: Network error: connection refused",
        ]);
        assert_eq!(classify(&err).category, ErrorCategory::Safety);
    }

    #[test]
    fn test_server_messages() {
        let err = OperationError::Server("status 503: maintenance".to_string());
        assert_eq!(classify(&err).category, ErrorCategory::Server);
        assert_eq!(
            classify_message("Internal failure in worker").category,
            ErrorCategory::Server
        );
    }

    #[test]
    fn test_server_failure_quoting_other_words_stays_server() {
        for detail in [
            "worker aborted: invalid state in 3 records",
            "token bucket exhausted on shard 2",
            "connection pool drained",
        ] {
            let c = classify(&OperationError::Server(detail.to_string()));
            assert_eq!(c.category, ErrorCategory::Server, "{detail}");
            assert!(c.hint.offer_rollback);
            assert!(!c.hint.refresh_token);
        }
    }

    #[test]
    fn test_typed_variants_keep_their_category() {
        assert_eq!(
            classify(&OperationError::Network("invalid response framing".into())).category,
            ErrorCategory::Network
        );
        assert_eq!(
            classify(&OperationError::Validation("token column missing".into())).category,
            ErrorCategory::Validation
        );
        assert_eq!(
            classify(&OperationError::Authentication("connection reset".into())).category,
            ErrorCategory::Authentication
        );
    }

    #[test]
    fn test_internal_errors_fall_back_to_message_rules() {
        let err = OperationError::Internal("state directory: connection refused".into());
        assert_eq!(classify(&err).category, ErrorCategory::Network);
    }

    #[test]
    fn test_critical_audit_entry_is_a_server_failure() {
        let err = OperationError::CriticalAuditEntry("partial write".to_string());
        let c = classify(&err);
        assert_eq!(c.category, ErrorCategory::Server);
        assert!(c.hint.offer_rollback);
    }

    #[test]
    fn test_unknown_is_the_default() {
        let c = classify_message("something odd happened");
        assert_eq!(c.category, ErrorCategory::Unknown);
        assert_eq!(classify_message("").category, ErrorCategory::Unknown);
    }

    #[test]
    fn test_rollback_offer_only_for_partial_failure_categories() {
        assert!(hint_for(ErrorCategory::Network).offer_rollback);
        assert!(hint_for(ErrorCategory::Server).offer_rollback);
        assert!(hint_for(ErrorCategory::Unknown).offer_rollback);
        assert!(!hint_for(ErrorCategory::Validation).offer_rollback);
        assert!(!hint_for(ErrorCategory::Safety).offer_rollback);
        assert!(!hint_for(ErrorCategory::Authentication).offer_rollback);
    }

    #[test]
    fn test_user_message_hides_raw_text_by_default() {
        let c = classify_message("Server error: stack trace here");
        assert!(!user_message(&c, "stack trace here", false).contains("stack trace"));
        assert!(user_message(&c, "stack trace here", true).contains("stack trace"));
    }
}
