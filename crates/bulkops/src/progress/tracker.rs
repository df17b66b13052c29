use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use super::{ChannelError, ProgressCallback, ProgressChannel};
use crate::models::TerminalStatus;

type PendingTrack = Shared<BoxFuture<'static, Result<TerminalStatus, ChannelError>>>;

/// Single-slot wrapper around a [`ProgressChannel`]
///
/// While a session is being tracked, another `track` call for the same
/// session joins the pending future instead of opening a second channel.
/// Joining callers get the terminal status but not the frames; those go to
/// the callback of the call that opened the channel.
pub struct SessionTracker {
    channel: Arc<dyn ProgressChannel>,
    slot: Mutex<Option<(String, PendingTrack)>>,
}

impl SessionTracker {
    pub fn new(channel: Arc<dyn ProgressChannel>) -> Self {
        Self {
            channel,
            slot: Mutex::new(None),
        }
    }

    pub fn channel_name(&self) -> &'static str {
        self.channel.name()
    }

    pub async fn track(
        &self,
        session_id: &str,
        on_frame: ProgressCallback,
    ) -> Result<TerminalStatus, ChannelError> {
        let pending = {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some((active, pending)) if active == session_id => {
                    debug!(session_id, "joining in-flight tracking");
                    pending.clone()
                }
                _ => {
                    let channel = self.channel.clone();
                    let session = session_id.to_string();
                    let pending = async move { channel.track(&session, on_frame).await }
                        .boxed()
                        .shared();
                    *slot = Some((session_id.to_string(), pending.clone()));
                    pending
                }
            }
        };

        let _release = SlotRelease {
            slot: &self.slot,
            session_id,
        };
        pending.await
    }
}

/// Empties the slot when a `track` call returns or is dropped, so an
/// abandoned channel does not outlive its callers
struct SlotRelease<'a> {
    slot: &'a Mutex<Option<(String, PendingTrack)>>,
    session_id: &'a str,
}

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        let released = {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some((active, _)) if active == self.session_id => slot.take(),
                _ => None,
            }
        };
        if released.is_some() {
            debug!(session_id = self.session_id, "tracking slot released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OperationReport, ProgressFrame};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct GatedChannel {
        opened: AtomicUsize,
        release: Notify,
    }

    #[async_trait]
    impl ProgressChannel for GatedChannel {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn track(
            &self,
            _session_id: &str,
            on_frame: ProgressCallback,
        ) -> Result<TerminalStatus, ChannelError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            let frame = ProgressFrame::completed(1, OperationReport::default());
            on_frame(&frame);
            Ok(TerminalStatus::Completed(frame))
        }
    }

    fn noop() -> ProgressCallback {
        Arc::new(|_: &ProgressFrame| {})
    }

    #[tokio::test]
    async fn test_second_caller_joins_pending_track() {
        let channel = Arc::new(GatedChannel {
            opened: AtomicUsize::new(0),
            release: Notify::new(),
        });
        let tracker = Arc::new(SessionTracker::new(channel.clone()));

        let first = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.track("s-1", noop()).await }
        });
        while channel.opened.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        let second = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.track("s-1", noop()).await }
        });
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        channel.release.notify_waiters();
        // Release again in case the second caller registered late
        channel.release.notify_one();

        let a = first.await.unwrap().unwrap();
        let b = second.await.unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(channel.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slot_is_cleared_after_completion() {
        let channel = Arc::new(GatedChannel {
            opened: AtomicUsize::new(0),
            release: Notify::new(),
        });
        channel.release.notify_one();
        let tracker = SessionTracker::new(channel.clone());

        tracker.track("s-1", noop()).await.unwrap();
        channel.release.notify_one();
        tracker.track("s-1", noop()).await.unwrap();

        assert_eq!(channel.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropped_track_releases_the_channel() {
        let channel = Arc::new(GatedChannel {
            opened: AtomicUsize::new(0),
            release: Notify::new(),
        });
        let tracker = SessionTracker::new(channel.clone());

        let abandoned =
            tokio::time::timeout(std::time::Duration::from_millis(20), tracker.track("s-1", noop()))
                .await;

        assert!(abandoned.is_err());
        assert_eq!(channel.opened.load(Ordering::SeqCst), 1);
        assert!(tracker.slot.lock().unwrap().is_none());
        // Only the test and the tracker still hold the channel
        assert_eq!(Arc::strong_count(&channel), 2);
    }
}
