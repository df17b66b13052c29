use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, warn};

use super::{terminal_status, ChannelError, ProgressCallback, ProgressChannel};
use crate::client::DirectoryClient;
use crate::error::ClientError;
use crate::models::TerminalStatus;

/// Polls `GET /api/progress/:id` at a fixed interval
pub struct PollChannel {
    client: Arc<dyn DirectoryClient>,
    interval: Duration,
    max_failures: u32,
}

impl PollChannel {
    pub fn new(client: Arc<dyn DirectoryClient>, interval: Duration, max_failures: u32) -> Self {
        Self {
            client,
            interval,
            max_failures,
        }
    }
}

/// Client rejections other than server faults will not get better by retrying
fn is_retryable(error: &ClientError) -> bool {
    match error {
        ClientError::Api { status, .. } => *status >= 500 || *status == 429,
        _ => true,
    }
}

#[async_trait]
impl ProgressChannel for PollChannel {
    fn name(&self) -> &'static str {
        "poll"
    }

    #[instrument(skip(self, on_frame), fields(channel = "poll"))]
    async fn track(
        &self,
        session_id: &str,
        on_frame: ProgressCallback,
    ) -> Result<TerminalStatus, ChannelError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0u32;

        loop {
            ticker.tick().await;

            match self.client.progress(session_id).await {
                Ok(frame) => {
                    failures = 0;
                    debug!(percentage = frame.percentage, status = ?frame.status, "polled frame");
                    on_frame(&frame);

                    if let Some(status) = terminal_status(&frame) {
                        return Ok(status);
                    }
                }
                Err(e) if is_retryable(&e) && failures < self.max_failures => {
                    failures += 1;
                    warn!(error = %e, failures, max = self.max_failures, "progress poll failed");
                }
                Err(e) => return Err(ChannelError::Transport(e)),
            }
        }
    }
}
