//! CLI command implementations

pub mod audit;
pub mod checkpoints;
pub mod rollback;
pub mod run;

use std::path::PathBuf;
use std::sync::Arc;

use bulkops::{
    AuditSink, Confirmer, HttpDirectoryClient, Notifier, Orchestrator, OrchestratorConfig,
};
use clap::Args;
use tracing::debug;

use crate::error::CliResult;
use crate::paths::ConfigPaths;

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory service base URL
    #[arg(long, env = "BULKOPS_API_URL", global = true)]
    pub api_url: Option<String>,

    /// API bearer token
    #[arg(long, env = "BULKOPS_API_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Config file (defaults to config.json in the config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Log filter, e.g. "info" or "bulkops=debug"
    #[arg(long, default_value = "warn", global = true)]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Resolved configuration for one invocation
pub struct Context {
    pub paths: ConfigPaths,
    pub config: OrchestratorConfig,
    pub json: bool,
}

impl Context {
    /// Layer defaults, config file, environment and command-line flags
    pub fn load(global: &GlobalArgs) -> CliResult<Self> {
        let paths = ConfigPaths::new()?;
        Self::load_with_paths(global, paths)
    }

    pub fn load_with_paths(global: &GlobalArgs, paths: ConfigPaths) -> CliResult<Self> {
        let config_file = global.config.clone().unwrap_or_else(|| paths.config_file.clone());
        debug!(path = %config_file.display(), "loading configuration");
        let mut config = OrchestratorConfig::load(&config_file)?;

        if let Some(url) = &global.api_url {
            config.api_url = url.clone();
        }
        if let Some(token) = global.token.clone().filter(|t| !t.is_empty()) {
            config.api_token = Some(token);
        }
        if config.state_dir.is_none() {
            config.state_dir = Some(paths.state_dir.clone());
        }

        Ok(Self {
            paths,
            config,
            json: global.json,
        })
    }

    /// Build an orchestrator talking to the configured directory service
    pub fn orchestrator(
        &self,
        notifier: Arc<dyn Notifier>,
        confirmer: Arc<dyn Confirmer>,
    ) -> CliResult<Arc<Orchestrator>> {
        if let Some(dir) = &self.config.state_dir {
            std::fs::create_dir_all(dir)?;
        } else {
            self.paths.ensure_dirs_exist()?;
        }

        let client = Arc::new(HttpDirectoryClient::new(&self.config)?);
        let sink: Arc<dyn AuditSink> = client.clone();
        let orchestrator = Orchestrator::builder(self.config.clone(), client)
            .notifier(notifier)
            .confirmer(confirmer)
            .audit_sink(sink)
            .build()?;
        Ok(Arc::new(orchestrator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn global() -> GlobalArgs {
        GlobalArgs {
            api_url: None,
            token: None,
            config: None,
            json: false,
            log_level: "warn".to_string(),
            log_json: false,
        }
    }

    #[test]
    fn test_flags_override_config_file() {
        let tmp = TempDir::new().unwrap();
        let paths = ConfigPaths::in_dir(tmp.path());
        std::fs::write(
            &paths.config_file,
            r#"{"api_url": "https://file.example.com", "max_delete_records": 50}"#,
        )
        .unwrap();

        let args = GlobalArgs {
            api_url: Some("https://flag.example.com".to_string()),
            token: Some("secret".to_string()),
            ..global()
        };
        let ctx = Context::load_with_paths(&args, paths).unwrap();

        assert_eq!(ctx.config.api_url, "https://flag.example.com");
        assert_eq!(ctx.config.api_token.as_deref(), Some("secret"));
        assert_eq!(ctx.config.max_delete_records, 50);
    }

    #[test]
    fn test_state_dir_defaults_to_config_dir() {
        let tmp = TempDir::new().unwrap();
        let paths = ConfigPaths::in_dir(tmp.path());
        let expected = paths.state_dir.clone();

        let ctx = Context::load_with_paths(&global(), paths).unwrap();

        assert_eq!(ctx.config.state_dir, Some(expected));
    }

    #[tokio::test]
    async fn test_orchestrator_creates_state_dir() {
        let tmp = TempDir::new().unwrap();
        let paths = ConfigPaths::in_dir(tmp.path());
        let ctx = Context::load_with_paths(&global(), paths).unwrap();

        let orchestrator = ctx
            .orchestrator(
                Arc::new(bulkops::collaborators::LogNotifier),
                Arc::new(bulkops::FixedConfirmer(false)),
            )
            .unwrap();

        assert!(!orchestrator.is_running());
        assert!(ctx.config.state_dir.as_ref().unwrap().is_dir());
    }
}
