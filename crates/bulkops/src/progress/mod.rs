//! Progress tracking for submitted sessions
//!
//! A [`ProgressChannel`] follows one session until it reaches a terminal
//! status, handing every frame to a callback. [`StreamChannel`] reads the
//! push stream, [`PollChannel`] polls the status endpoint and
//! [`FallbackChannel`] starts on the former and switches to the latter on a
//! transport failure. Callers only see the trait.

mod fallback;
mod poll;
mod probe;
mod stream;
mod tracker;

pub use fallback::FallbackChannel;
pub use poll::PollChannel;
pub use probe::probe_latency;
pub use stream::StreamChannel;
pub use tracker::SessionTracker;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::client::DirectoryClient;
use crate::config::OrchestratorConfig;
use crate::error::ClientError;
use crate::models::{ProgressFrame, TerminalStatus};

/// Receives every frame, in the order the channel produced them
pub type ProgressCallback = Arc<dyn Fn(&ProgressFrame) + Send + Sync>;

/// Failure of the channel itself, as opposed to a failed session
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("progress transport failed: {0}")]
    Transport(ClientError),
    #[error("progress stream ended before the session finished")]
    Closed,
}

impl ChannelError {
    /// Underlying client error, with a closed stream reported as a network fault
    pub fn into_client_error(self) -> ClientError {
        match self {
            ChannelError::Transport(e) => e,
            ChannelError::Closed => {
                ClientError::Network("progress stream closed before a terminal status".to_string())
            }
        }
    }
}

#[async_trait]
pub trait ProgressChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Follow `session_id` until it completes or fails
    async fn track(
        &self,
        session_id: &str,
        on_frame: ProgressCallback,
    ) -> Result<TerminalStatus, ChannelError>;
}

/// Terminal status for a terminal frame, `None` while still running
pub(crate) fn terminal_status(frame: &ProgressFrame) -> Option<TerminalStatus> {
    use crate::models::FrameStatus;

    match frame.status {
        FrameStatus::Running => None,
        FrameStatus::Completed => Some(TerminalStatus::Completed(frame.clone())),
        FrameStatus::Failed => Some(TerminalStatus::Failed(
            frame
                .error
                .clone()
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| frame.message.clone()),
        )),
    }
}

/// Pick a channel for this client: stream-with-fallback when the push stream
/// is enabled and supported, plain polling otherwise
pub fn select_channel(
    config: &OrchestratorConfig,
    client: Arc<dyn DirectoryClient>,
) -> Arc<dyn ProgressChannel> {
    let poll = PollChannel::new(client.clone(), config.poll_interval(), config.max_poll_failures);

    if config.streaming_enabled && client.supports_streaming() {
        Arc::new(FallbackChannel::new(StreamChannel::new(client), poll))
    } else {
        Arc::new(poll)
    }
}
