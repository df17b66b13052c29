//! Audit log recorder
//!
//! Every entry is appended to a capped local log that is persisted under
//! [`AUDIT_LOG_KEY`], then mirrored to a remote sink on a best-effort basis.
//! Neither step can fail the operation that produced the entry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ClientResult;
use crate::models::AuditEntry;
use crate::ring::RingBuffer;
use crate::store::{load_json, save_json, KeyValueStore, AUDIT_LOG_KEY};

/// Remote destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn mirror(&self, entry: &AuditEntry) -> ClientResult<()>;
}

/// Sink that drops everything, for setups without a remote audit endpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn mirror(&self, _entry: &AuditEntry) -> ClientResult<()> {
        Ok(())
    }
}

/// Appends audit entries locally and mirrors them remotely
pub struct AuditRecorder {
    store: Arc<dyn KeyValueStore>,
    sink: Arc<dyn AuditSink>,
    entries: Mutex<RingBuffer<AuditEntry>>,
    mirror_timeout: Duration,
}

impl AuditRecorder {
    /// Create a recorder, loading any previously persisted entries
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn AuditSink>,
        capacity: usize,
        mirror_timeout: Duration,
    ) -> Self {
        let persisted: Vec<AuditEntry> = match load_json(store.as_ref(), AUDIT_LOG_KEY) {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "discarding unreadable audit log");
                Vec::new()
            }
        };

        Self {
            store,
            sink,
            entries: Mutex::new(RingBuffer::from_newest_first(capacity, persisted)),
            mirror_timeout,
        }
    }

    /// Record an entry; never fails
    pub async fn record(&self, entry: AuditEntry) {
        debug!(
            operation = %entry.operation,
            status = %entry.status,
            session_id = entry.session_id.as_deref().unwrap_or("-"),
            "recording audit entry"
        );

        self.append_local(entry.clone());

        match tokio::time::timeout(self.mirror_timeout, self.sink.mirror(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "remote audit mirror failed"),
            Err(_) => warn!(
                timeout_ms = self.mirror_timeout.as_millis() as u64,
                "remote audit mirror timed out"
            ),
        }
    }

    fn append_local(&self, entry: AuditEntry) {
        let snapshot = match self.entries.lock() {
            Ok(mut entries) => {
                entries.push(entry);
                entries.to_vec()
            }
            Err(e) => {
                warn!(error = %e, "audit log lock poisoned, entry kept in memory only");
                return;
            }
        };

        if let Err(e) = save_json(self.store.as_ref(), AUDIT_LOG_KEY, &snapshot) {
            warn!(error = %e, "failed to persist audit log");
        }
    }

    /// Local entries, newest first
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.to_vec())
            .unwrap_or_default()
    }
}
