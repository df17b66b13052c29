//! Guarded bulk operations against a remote directory service
//!
//! The [`Orchestrator`] sequences preflight checks, validation, the safety
//! gate, rollback checkpoints, submission, progress monitoring and
//! post-checks for one import, export, delete or modify run at a time, and
//! records every run in a local audit log.
//!
//! ```no_run
//! use std::sync::Arc;
//! use bulkops::{HttpDirectoryClient, Orchestrator, OrchestratorConfig, OperationOptions, OperationType};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrchestratorConfig::from_env()?;
//! let client = Arc::new(HttpDirectoryClient::new(&config)?);
//! let orchestrator = Orchestrator::builder(config, client).build()?;
//!
//! let outcome = orchestrator
//!     .start(OperationType::Export, OperationOptions::for_population("pop-1"))
//!     .await?;
//! println!("exported {}", outcome.report.affected(OperationType::Export));
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod checkpoint;
pub mod checks;
pub mod classifier;
pub mod client;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod ring;
pub mod safety;
pub mod store;

pub use audit::{AuditRecorder, AuditSink, NullAuditSink};
pub use checkpoint::CheckpointStore;
pub use classifier::{classify, Classification, ErrorCategory, RecoveryHint};
pub use client::{DirectoryClient, HttpDirectoryClient};
pub use collaborators::{
    Confirmer, FileValidator, FixedConfirmer, Notifier, OperationEvent, RollbackOffer,
    TokenValidator,
};
pub use config::{ConfigError, OrchestratorConfig};
pub use error::{ClientError, ClientResult, OperationError, OperationResult};
pub use models::{
    AuditEntry, Operation, OperationOptions, OperationOutcome, OperationReport, OperationStatus,
    OperationType, Progress, RollbackCheckpoint,
};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use progress::{ProgressChannel, SessionTracker};
pub use store::{FileStore, KeyValueStore, MemoryStore};
