//! Orchestrator configuration
//!
//! Values come from an optional JSON file and are then overridden by
//! `BULKOPS_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Names that can never be the target of a delete or modify run
pub const DEFAULT_PROTECTED_COLLECTIONS: &[&str] = &["admin", "administrators", "system", "default"];

/// Configuration for the operation orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Base URL of the directory service (e.g. `https://idm.example.com`)
    pub api_url: String,

    /// Bearer token sent with every request
    #[serde(skip_serializing)]
    pub api_token: Option<String>,

    /// Per-request timeout for the HTTP client
    pub request_timeout_secs: u64,

    /// Interval between status polls when the push stream is unavailable
    pub poll_interval_ms: u64,

    /// Consecutive failed polls tolerated before giving up
    pub max_poll_failures: u32,

    /// Whether to try the push stream before polling
    pub streaming_enabled: bool,

    /// Hard timeout of the connectivity probe
    pub latency_probe_timeout_ms: u64,

    /// Upper bound on records a single delete may touch
    pub max_delete_records: u64,

    /// Upper bound on records a single modify may touch
    pub max_modify_records: u64,

    /// Collection names blocked for destructive runs (case-insensitive)
    pub protected_collections: Vec<String>,

    /// Force every run to stop before the mutating call
    pub dry_run: bool,

    /// Include raw error text in user-facing failure messages
    pub show_error_details: bool,

    pub checkpoint_capacity: usize,
    pub audit_capacity: usize,
    pub history_capacity: usize,

    /// Upper bound on the remote audit mirror call
    pub audit_mirror_timeout_ms: u64,

    /// Largest input file accepted by the file validator
    pub max_file_bytes: u64,

    /// Directory holding persisted checkpoints and audit entries
    pub state_dir: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            api_token: None,
            request_timeout_secs: 30,
            poll_interval_ms: 1000,
            max_poll_failures: 5,
            streaming_enabled: true,
            latency_probe_timeout_ms: 3000,
            max_delete_records: 1000,
            max_modify_records: 1000,
            protected_collections: DEFAULT_PROTECTED_COLLECTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            dry_run: false,
            show_error_details: false,
            checkpoint_capacity: 10,
            audit_capacity: 100,
            history_capacity: 100,
            audit_mirror_timeout_ms: 5000,
            max_file_bytes: 10 * 1024 * 1024,
            state_dir: None,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        Self::default().apply_reader(reader)
    }

    /// Load a JSON config file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_reader(path, |key| std::env::var(key))
    }

    pub fn load_with_reader<F>(path: &Path, reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let base = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::File(path.display().to_string(), e.to_string()))?;
            serde_json::from_str(&content)
                .map_err(|e| ConfigError::File(path.display().to_string(), e.to_string()))?
        } else {
            Self::default()
        };
        base.apply_reader(reader)
    }

    fn apply_reader<F>(mut self, reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        if let Ok(url) = reader("BULKOPS_API_URL") {
            self.api_url = url;
        }
        if let Ok(token) = reader("BULKOPS_API_TOKEN") {
            self.api_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(v) = parse_var(&reader, "BULKOPS_REQUEST_TIMEOUT_SECS")? {
            self.request_timeout_secs = v;
        }
        if let Some(v) = parse_var(&reader, "BULKOPS_POLL_INTERVAL_MS")? {
            self.poll_interval_ms = v;
        }
        if let Some(v) = parse_var(&reader, "BULKOPS_MAX_POLL_FAILURES")? {
            self.max_poll_failures = v;
        }
        if let Some(v) = parse_var(&reader, "BULKOPS_STREAMING")? {
            self.streaming_enabled = v;
        }
        if let Some(v) = parse_var(&reader, "BULKOPS_MAX_DELETE_RECORDS")? {
            self.max_delete_records = v;
        }
        if let Some(v) = parse_var(&reader, "BULKOPS_MAX_MODIFY_RECORDS")? {
            self.max_modify_records = v;
        }
        if let Ok(list) = reader("BULKOPS_PROTECTED_COLLECTIONS") {
            self.protected_collections = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = parse_var(&reader, "BULKOPS_DRY_RUN")? {
            self.dry_run = v;
        }
        if let Some(v) = parse_var(&reader, "BULKOPS_SHOW_ERROR_DETAILS")? {
            self.show_error_details = v;
        }
        if let Ok(dir) = reader("BULKOPS_STATE_DIR") {
            self.state_dir = Some(PathBuf::from(dir));
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(
                "api_url".into(),
                format!("expected an http(s) URL, got '{}'", self.api_url),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "poll_interval_ms".into(),
                "must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// API URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn latency_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.latency_probe_timeout_ms)
    }

    pub fn audit_mirror_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_mirror_timeout_ms)
    }
}

fn parse_var<F, T>(reader: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match reader(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(key.into(), e.to_string())),
        Err(_) => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("failed to load config file {0}: {1}")]
    File(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env::VarError;
    use tempfile::TempDir;

    /// Create a reader closure from a HashMap (no global env mutation).
    fn make_reader(vars: HashMap<&str, &str>) -> impl Fn(&str) -> Result<String, VarError> {
        let owned: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| owned.get(key).cloned().ok_or(VarError::NotPresent)
    }

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::from_reader(make_reader(HashMap::new())).unwrap();
        assert_eq!(config.max_delete_records, 1000);
        assert_eq!(config.checkpoint_capacity, 10);
        assert_eq!(config.audit_capacity, 100);
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.latency_probe_timeout(), Duration::from_secs(3));
        assert!(config.streaming_enabled);
        assert!(config.protected_collections.iter().any(|c| c == "admin"));
    }

    #[test]
    fn test_env_overrides() {
        let config = OrchestratorConfig::from_reader(make_reader(HashMap::from([
            ("BULKOPS_API_URL", "https://idm.example.com/"),
            ("BULKOPS_API_TOKEN", "secret"),
            ("BULKOPS_MAX_DELETE_RECORDS", "250"),
            ("BULKOPS_STREAMING", "false"),
            ("BULKOPS_PROTECTED_COLLECTIONS", "root, Staff ,"),
        ])))
        .unwrap();

        assert_eq!(config.base_url(), "https://idm.example.com");
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.max_delete_records, 250);
        assert!(!config.streaming_enabled);
        assert_eq!(config.protected_collections, vec!["root", "Staff"]);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let result = OrchestratorConfig::from_reader(make_reader(HashMap::from([(
            "BULKOPS_MAX_DELETE_RECORDS",
            "lots",
        )])));
        assert!(matches!(result, Err(ConfigError::InvalidValue(key, _)) if key == "BULKOPS_MAX_DELETE_RECORDS"));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let result = OrchestratorConfig::from_reader(make_reader(HashMap::from([(
            "BULKOPS_API_URL",
            "idm.example.com",
        )])));
        assert!(result.is_err());
    }

    #[test]
    fn test_file_then_env_layering() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"api_url":"https://file.example.com","max_delete_records":50,"dry_run":true}"#,
        )
        .unwrap();

        let config = OrchestratorConfig::load_with_reader(
            &path,
            make_reader(HashMap::from([("BULKOPS_MAX_DELETE_RECORDS", "75")])),
        )
        .unwrap();

        assert_eq!(config.api_url, "https://file.example.com");
        assert_eq!(config.max_delete_records, 75);
        assert!(config.dry_run);
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = OrchestratorConfig::load_with_reader(
            &temp_dir.path().join("absent.json"),
            make_reader(HashMap::new()),
        )
        .unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }
}
