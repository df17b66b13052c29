use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, instrument};

use super::{terminal_status, ChannelError, ProgressCallback, ProgressChannel};
use crate::client::DirectoryClient;
use crate::models::TerminalStatus;

/// Reads frames from the service's push stream
pub struct StreamChannel {
    client: Arc<dyn DirectoryClient>,
}

impl StreamChannel {
    pub fn new(client: Arc<dyn DirectoryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProgressChannel for StreamChannel {
    fn name(&self) -> &'static str {
        "stream"
    }

    #[instrument(skip(self, on_frame), fields(channel = "stream"))]
    async fn track(
        &self,
        session_id: &str,
        on_frame: ProgressCallback,
    ) -> Result<TerminalStatus, ChannelError> {
        let mut frames = self
            .client
            .open_stream(session_id)
            .await
            .map_err(ChannelError::Transport)?;

        while let Some(item) = frames.next().await {
            let frame = item.map_err(ChannelError::Transport)?;
            debug!(percentage = frame.percentage, status = ?frame.status, "stream frame");
            on_frame(&frame);

            if let Some(status) = terminal_status(&frame) {
                return Ok(status);
            }
        }

        Err(ChannelError::Closed)
    }
}
