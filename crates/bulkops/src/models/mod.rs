//! Data model for bulk operations

pub mod api;
pub mod audit;
pub mod checkpoint;
pub mod frame;
pub mod operation;

pub use api::{Collection, RollbackResponse, SubmitResponse};
pub use audit::{AuditEntry, AuditStatus};
pub use checkpoint::RollbackCheckpoint;
pub use frame::{FrameStatus, ProgressFrame, TerminalStatus};
pub use operation::{
    AuditTrailEntry, ConflictPreview, Operation, OperationOptions, OperationOutcome,
    OperationReport, OperationStatus, OperationType, Progress,
};
