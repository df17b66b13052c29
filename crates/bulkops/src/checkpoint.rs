//! Rollback checkpoint store
//!
//! A checkpoint is written before every destructive submission so that a
//! later, explicit rollback request has something to refer to. The list is
//! persisted under [`CHECKPOINTS_KEY`], newest first, and capped.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{OperationOptions, OperationType, RollbackCheckpoint};
use crate::ring::RingBuffer;
use crate::store::{load_json, save_json, KeyValueStore, CHECKPOINTS_KEY};

/// Used when the options do not name who started the run
pub const DEFAULT_CREATED_BY: &str = "bulkops";

pub struct CheckpointStore {
    store: Arc<dyn KeyValueStore>,
    checkpoints: Mutex<RingBuffer<RollbackCheckpoint>>,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        let persisted: Vec<RollbackCheckpoint> = match load_json(store.as_ref(), CHECKPOINTS_KEY) {
            Ok(list) => list.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "discarding unreadable checkpoint list");
                Vec::new()
            }
        };

        Self {
            store,
            checkpoints: Mutex::new(RingBuffer::from_newest_first(capacity, persisted)),
        }
    }

    /// Record a checkpoint for the run described by `options`
    ///
    /// Never fails. When the checkpoint cannot be persisted the returned
    /// value is a placeholder with `error` set and it is not listed.
    pub fn create(&self, op_type: OperationType, options: &OperationOptions) -> RollbackCheckpoint {
        let mut checkpoint = RollbackCheckpoint {
            id: format!("checkpoint-{}", Uuid::new_v4()),
            timestamp: Utc::now(),
            operation_type: op_type,
            target_collection_id: options.population().map(String::from),
            target_collection_name: options.population_name.clone(),
            record_count: options.user_count.unwrap_or(0),
            created_by: options
                .created_by
                .clone()
                .unwrap_or_else(|| DEFAULT_CREATED_BY.to_string()),
            error: None,
        };

        match self.persist(checkpoint.clone()) {
            Ok(()) => {
                info!(
                    checkpoint_id = %checkpoint.id,
                    operation_type = %op_type,
                    record_count = checkpoint.record_count,
                    "rollback checkpoint created"
                );
            }
            Err(reason) => {
                warn!(checkpoint_id = %checkpoint.id, error = %reason, "rollback checkpoint not saved");
                checkpoint.error = Some(reason);
            }
        }

        checkpoint
    }

    fn persist(&self, checkpoint: RollbackCheckpoint) -> Result<(), String> {
        let mut checkpoints = self
            .checkpoints
            .lock()
            .map_err(|e| format!("checkpoint list unavailable: {e}"))?;

        let mut next = checkpoints.clone();
        next.push(checkpoint);
        save_json(self.store.as_ref(), CHECKPOINTS_KEY, &next.to_vec()).map_err(|e| e.to_string())?;

        *checkpoints = next;
        Ok(())
    }

    /// Saved checkpoints, newest first
    pub fn list(&self) -> Vec<RollbackCheckpoint> {
        self.checkpoints
            .lock()
            .map(|checkpoints| checkpoints.to_vec())
            .unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<RollbackCheckpoint> {
        self.checkpoints
            .lock()
            .ok()
            .and_then(|checkpoints| checkpoints.iter().find(|c| c.id == id).cloned())
    }
}
