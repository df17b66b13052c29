use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::{ChannelError, PollChannel, ProgressCallback, ProgressChannel, StreamChannel};
use crate::models::{ProgressFrame, TerminalStatus};

/// Push stream first, status polling once the stream breaks
///
/// Both legs deliver through the same callback. Percentages are clamped to
/// the highest value already delivered, so a poll that lags behind the last
/// pushed frame never moves progress backwards.
pub struct FallbackChannel {
    stream: StreamChannel,
    poll: PollChannel,
}

impl FallbackChannel {
    pub fn new(stream: StreamChannel, poll: PollChannel) -> Self {
        Self { stream, poll }
    }
}

fn monotonic(on_frame: ProgressCallback) -> ProgressCallback {
    let high_water = Arc::new(AtomicU8::new(0));

    Arc::new(move |frame: &ProgressFrame| {
        let previous = high_water.fetch_max(frame.percentage, Ordering::SeqCst);
        if frame.percentage < previous {
            let mut clamped = frame.clone();
            clamped.percentage = previous;
            on_frame(&clamped);
        } else {
            on_frame(frame);
        }
    })
}

#[async_trait]
impl ProgressChannel for FallbackChannel {
    fn name(&self) -> &'static str {
        "stream+poll"
    }

    #[instrument(skip(self, on_frame))]
    async fn track(
        &self,
        session_id: &str,
        on_frame: ProgressCallback,
    ) -> Result<TerminalStatus, ChannelError> {
        let on_frame = monotonic(on_frame);

        match self.stream.track(session_id, on_frame.clone()).await {
            Ok(status) => Ok(status),
            Err(e) => {
                warn!(error = %e, "push stream failed, falling back to polling");
                let status = self.poll.track(session_id, on_frame).await?;
                info!("session finished on poll fallback");
                Ok(status)
            }
        }
    }
}
