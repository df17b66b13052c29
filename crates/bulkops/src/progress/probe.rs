use std::time::{Duration, Instant};

use tracing::debug;

use crate::client::DirectoryClient;

/// Round-trip time of a health check, or `None` on error or timeout
pub async fn probe_latency(client: &dyn DirectoryClient, timeout: Duration) -> Option<Duration> {
    let started = Instant::now();

    match tokio::time::timeout(timeout, client.ping()).await {
        Ok(Ok(())) => {
            let elapsed = started.elapsed();
            debug!(latency_ms = elapsed.as_millis() as u64, "latency probe");
            Some(elapsed)
        }
        Ok(Err(e)) => {
            debug!(error = %e, "latency probe failed");
            None
        }
        Err(_) => {
            debug!(timeout_ms = timeout.as_millis() as u64, "latency probe timed out");
            None
        }
    }
}
