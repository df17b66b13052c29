//! Directory service client
//!
//! The orchestrator talks to the identity service only through
//! [`DirectoryClient`]; [`HttpDirectoryClient`] is the REST implementation.

mod http;
pub mod sse;

pub use http::HttpDirectoryClient;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{ClientError, ClientResult};
use crate::models::{
    Collection, OperationType, ProgressFrame, RollbackCheckpoint, RollbackResponse,
    SubmitResponse,
};

/// Live sequence of progress frames from the push channel
pub type FrameStream = BoxStream<'static, ClientResult<ProgressFrame>>;

/// Operations the orchestrator needs from the directory service
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Submit a mutating request (`POST /api/{type}`)
    async fn submit(
        &self,
        op_type: OperationType,
        payload: &serde_json::Value,
    ) -> ClientResult<SubmitResponse>;

    /// Fetch the latest frame for a session (`GET /api/progress/:id`)
    async fn progress(&self, session_id: &str) -> ClientResult<ProgressFrame>;

    /// Whether [`open_stream`](Self::open_stream) is worth trying
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Subscribe to pushed frames for a session
    async fn open_stream(&self, session_id: &str) -> ClientResult<FrameStream> {
        Err(ClientError::Network(format!(
            "push stream not supported for session {session_id}"
        )))
    }

    /// Ask the service to stop a session (`POST /api/cancel/:id`)
    async fn cancel(&self, session_id: &str) -> ClientResult<()>;

    /// Request recovery from a checkpoint (`POST /api/delete/rollback`)
    async fn rollback(&self, checkpoint: &RollbackCheckpoint) -> ClientResult<RollbackResponse>;

    /// Look up a target population
    async fn get_collection(&self, collection_id: &str) -> ClientResult<Collection>;

    /// Cheap round trip used for connectivity checks
    async fn ping(&self) -> ClientResult<()>;
}
