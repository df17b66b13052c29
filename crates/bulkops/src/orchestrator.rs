//! Operation orchestrator
//!
//! Runs one bulk operation at a time through its phases:
//!
//! ```text
//! Initializing -> PreflightChecking -> Validating -> Executing -> Monitoring -> PostValidating -> Completed
//! ```
//!
//! Delete and Modify additionally pass the safety gate, a confirmation, a
//! rollback checkpoint and a connectivity check between validation and
//! submission. Any phase may end in Failed or Cancelled. On every exit the
//! operation is moved into history and the single-flight slot is released.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::audit::{AuditRecorder, AuditSink, NullAuditSink};
use crate::checkpoint::CheckpointStore;
use crate::checks::{build_payload, CheckContext, Checks};
use crate::classifier::{classify, user_message};
use crate::client::DirectoryClient;
use crate::collaborators::{
    BasicFileValidator, Confirmer, FileValidator, LogNotifier, Notifier, OperationEvent,
    RollbackOffer, StaticTokenValidator, TerminalConfirmer, TokenValidator,
};
use crate::config::OrchestratorConfig;
use crate::error::{OperationError, OperationResult};
use crate::models::{
    AuditEntry, AuditStatus, Operation, OperationOptions, OperationOutcome,
    OperationReport, OperationStatus, OperationType, ProgressFrame, RollbackCheckpoint,
    RollbackResponse, TerminalStatus,
};
use crate::progress::{probe_latency, select_channel, ProgressCallback, ProgressChannel, SessionTracker};
use crate::ring::RingBuffer;
use crate::safety::{SafetyGate, SafetyReport};
use crate::store::{FileStore, KeyValueStore, MemoryStore};

// ============================================================================
// State
// ============================================================================

struct ActiveOperation {
    operation: Operation,
    checkpoint: Option<RollbackCheckpoint>,
    /// An audit "started" entry was written
    audit_started: bool,
    /// The mutating call was issued
    submitted: bool,
    cancel_tx: watch::Sender<bool>,
}

struct OrchestratorState {
    active: Option<ActiveOperation>,
    history: RingBuffer<Operation>,
}

impl OrchestratorState {
    /// Move the active operation into history with a terminal status
    ///
    /// Returns `None` when `id` is no longer the active operation, which
    /// means someone else already finalized it.
    fn finalize(
        &mut self,
        id: Uuid,
        status: OperationStatus,
        result: Option<OperationReport>,
        error: Option<String>,
    ) -> Option<ActiveOperation> {
        if self.active.as_ref().map(|a| a.operation.id) != Some(id) {
            return None;
        }
        let mut active = self.active.take()?;

        let operation = &mut active.operation;
        operation.status = status;
        operation.end_time = Some(Utc::now());
        operation.result = result;
        operation.error = error;
        if status == OperationStatus::Cancelled {
            operation.progress.percentage = operation.progress.partial_percentage();
            active.cancel_tx.send_replace(true);
        }

        self.history.push(active.operation.clone());
        Some(active)
    }
}

type SharedState = Arc<Mutex<OrchestratorState>>;

fn lock(state: &Mutex<OrchestratorState>) -> MutexGuard<'_, OrchestratorState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Records the operation as cancelled if `start` is dropped or panics
/// before it finalizes
struct AbandonGuard {
    state: SharedState,
    operation_id: Uuid,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        let finalized = lock(&self.state).finalize(
            self.operation_id,
            OperationStatus::Cancelled,
            None,
            None,
        );
        if finalized.is_some() {
            warn!(operation_id = %self.operation_id, "operation abandoned before finishing, recorded as cancelled");
        }
    }
}

/// Resolves once the cancel flag is raised
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn audit_entry(
    operation: &Operation,
    status: AuditStatus,
    checkpoint: Option<&RollbackCheckpoint>,
) -> AuditEntry {
    AuditEntry::new(operation.op_type, status)
        .with_session(operation.session_id.clone())
        .with_target(
            operation.options.population().map(String::from),
            operation.options.population_name.clone(),
        )
        .with_record_count(operation.options.user_count.unwrap_or(0))
        .with_checkpoint(checkpoint.map(|c| c.id.clone()))
}

/// Successful end of the run, before finalizing
struct Completion {
    report: OperationReport,
    warnings: Vec<String>,
    session_id: Option<String>,
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles an [`Orchestrator`]; unset collaborators get their defaults
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    client: Arc<dyn DirectoryClient>,
    tokens: Option<Arc<dyn TokenValidator>>,
    confirmer: Option<Arc<dyn Confirmer>>,
    notifier: Option<Arc<dyn Notifier>>,
    file_validator: Option<Arc<dyn FileValidator>>,
    store: Option<Arc<dyn KeyValueStore>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    channel: Option<Arc<dyn ProgressChannel>>,
    checks: Checks,
}

impl OrchestratorBuilder {
    pub fn token_validator(mut self, tokens: Arc<dyn TokenValidator>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = Some(confirmer);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn file_validator(mut self, file_validator: Arc<dyn FileValidator>) -> Self {
        self.file_validator = Some(file_validator);
        self
    }

    /// Persistence for checkpoints and the audit log
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Override the progress channel picked from the client's capabilities
    pub fn progress_channel(mut self, channel: Arc<dyn ProgressChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn checks(mut self, checks: Checks) -> Self {
        self.checks = checks;
        self
    }

    pub fn build(self) -> OperationResult<Orchestrator> {
        let config = self.config;

        let store: Arc<dyn KeyValueStore> = match (self.store, config.state_dir.as_ref()) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(
                FileStore::open(dir).map_err(|e| OperationError::Internal(e.to_string()))?,
            ),
            (None, None) => Arc::new(MemoryStore::new()),
        };

        let file_validator = self
            .file_validator
            .unwrap_or_else(|| Arc::new(BasicFileValidator::new(config.max_file_bytes)));
        let channel = self
            .channel
            .unwrap_or_else(|| select_channel(&config, self.client.clone()));
        let sink = self.audit_sink.unwrap_or_else(|| Arc::new(NullAuditSink));

        Ok(Orchestrator {
            tokens: self
                .tokens
                .unwrap_or_else(|| Arc::new(StaticTokenValidator::new(config.api_token.clone()))),
            confirmer: self.confirmer.unwrap_or_else(|| Arc::new(TerminalConfirmer)),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
            safety: SafetyGate::new(&config, self.client.clone(), file_validator.clone()),
            checkpoints: CheckpointStore::new(store.clone(), config.checkpoint_capacity),
            audit: AuditRecorder::new(
                store,
                sink,
                config.audit_capacity,
                config.audit_mirror_timeout(),
            ),
            tracker: SessionTracker::new(channel),
            checks: self.checks,
            state: Arc::new(Mutex::new(OrchestratorState {
                active: None,
                history: RingBuffer::new(config.history_capacity),
            })),
            file_validator,
            client: self.client,
            config,
        })
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    config: OrchestratorConfig,
    client: Arc<dyn DirectoryClient>,
    tokens: Arc<dyn TokenValidator>,
    confirmer: Arc<dyn Confirmer>,
    notifier: Arc<dyn Notifier>,
    file_validator: Arc<dyn FileValidator>,
    safety: SafetyGate,
    checkpoints: CheckpointStore,
    audit: AuditRecorder,
    tracker: SessionTracker,
    checks: Checks,
    state: SharedState,
}

impl Orchestrator {
    pub fn builder(config: OrchestratorConfig, client: Arc<dyn DirectoryClient>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            client,
            tokens: None,
            confirmer: None,
            notifier: None,
            file_validator: None,
            store: None,
            audit_sink: None,
            channel: None,
            checks: Checks::default(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run a bulk operation to completion
    ///
    /// Fails immediately with [`OperationError::Busy`] while another
    /// operation is in flight.
    #[instrument(skip(self, options), fields(operation_type = %op_type))]
    pub async fn start(
        &self,
        op_type: OperationType,
        options: OperationOptions,
    ) -> OperationResult<OperationOutcome> {
        let (operation_id, cancel_rx) = self.begin(op_type, &options)?;
        let _guard = AbandonGuard {
            state: self.state.clone(),
            operation_id,
        };

        self.notifier.on_event(&OperationEvent::Started {
            operation_id,
            op_type,
        });

        let result = self.run(operation_id, op_type, &options, cancel_rx).await;
        match result {
            Ok(completion) => self.complete(operation_id, op_type, completion).await,
            Err(e) if e.is_cancellation() => self.abort(operation_id, op_type, e).await,
            Err(e) => self.fail(operation_id, op_type, e).await,
        }
    }

    fn begin(
        &self,
        op_type: OperationType,
        options: &OperationOptions,
    ) -> OperationResult<(Uuid, watch::Receiver<bool>)> {
        let mut state = lock(&self.state);

        if let Some(active) = state.active.as_ref() {
            let running = active.operation.op_type;
            warn!(%running, requested = %op_type, "operation rejected, another one is running");
            return Err(OperationError::Busy { running });
        }

        let operation = Operation::new(op_type, options.clone());
        let operation_id = operation.id;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        state.active = Some(ActiveOperation {
            operation,
            checkpoint: None,
            audit_started: false,
            submitted: false,
            cancel_tx,
        });

        info!(%operation_id, target = %options.target_label(), "operation started");
        Ok((operation_id, cancel_rx))
    }

    async fn run(
        &self,
        id: Uuid,
        op_type: OperationType,
        options: &OperationOptions,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> OperationResult<Completion> {
        let ctx = CheckContext {
            op_type,
            options,
            file_validator: self.file_validator.as_ref(),
        };

        self.enter(id, OperationStatus::PreflightChecking)?;
        self.tokens
            .validate()
            .await
            .map_err(OperationError::Authentication)?;
        (self.checks.pre.get(op_type))(&ctx)?;

        self.enter(id, OperationStatus::Validating)?;
        (self.checks.validate.get(op_type))(&ctx)?;

        let safety = if op_type.is_destructive() {
            self.safety.check(op_type, options).await?
        } else {
            SafetyReport::default()
        };

        if options.dry_run || self.config.dry_run {
            let would_affect = safety.record_count(options).unwrap_or(0);
            info!(operation_id = %id, would_affect, "dry run, nothing submitted");
            return Ok(Completion {
                report: OperationReport::dry_run(would_affect),
                warnings: Vec::new(),
                session_id: None,
            });
        }

        if op_type.is_destructive() {
            self.confirm(op_type, options, &safety).await?;

            let checkpoint = self.checkpoints.create(op_type, options);
            self.with_active(id, |active| active.checkpoint = Some(checkpoint))?;

            self.check_prerequisites().await?;
        }

        let payload = build_payload(op_type, options);

        self.enter(id, OperationStatus::Executing)?;
        let started = self.with_active(id, |active| {
            active.audit_started = true;
            audit_entry(&active.operation, AuditStatus::Started, active.checkpoint.as_ref())
        })?;
        self.audit.record(started).await;

        self.with_active(id, |active| active.submitted = true)?;
        let response = self.client.submit(op_type, &payload).await?;
        if !response.success {
            return Err(OperationError::Server(response.error.unwrap_or_else(|| {
                "request was not accepted by the directory service".to_string()
            })));
        }
        let session_id = response
            .session_id
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                OperationError::Server("submission accepted without a session id".to_string())
            })?;

        let attached = self.with_active(id, |active| {
            active.operation.session_id = Some(session_id.clone())
        });
        if attached.is_err() {
            self.cancel_late_session(id, &session_id).await;
            return Err(OperationError::Cancelled);
        }
        self.enter(id, OperationStatus::Monitoring)?;
        info!(
            operation_id = %id,
            session_id = %session_id,
            channel = self.tracker.channel_name(),
            "monitoring session"
        );

        let terminal = tokio::select! {
            status = self.tracker.track(&session_id, self.progress_callback(id)) => status,
            () = cancelled(&mut cancel_rx) => return Err(OperationError::Cancelled),
        };
        let report = match terminal {
            Ok(TerminalStatus::Completed(frame)) => frame.result.unwrap_or_default(),
            Ok(TerminalStatus::Failed(message)) => return Err(OperationError::Server(message)),
            Err(e) => return Err(e.into_client_error().into()),
        };

        self.enter(id, OperationStatus::PostValidating)?;
        let mut warnings = Vec::new();
        (self.checks.post.get(op_type))(&ctx, &report, &mut warnings)?;
        for warning in &warnings {
            warn!(operation_id = %id, %warning, "post-check finding");
        }

        Ok(Completion {
            report,
            warnings,
            session_id: Some(session_id),
        })
    }

    /// The operation was cancelled while its submission was in flight, so the
    /// session it started was never seen by `cancel`
    async fn cancel_late_session(&self, id: Uuid, session_id: &str) {
        warn!(
            operation_id = %id,
            %session_id,
            "session started after the operation was cancelled, cancelling it"
        );
        {
            let mut state = lock(&self.state);
            if let Some(operation) = state.history.iter_mut().find(|op| op.id == id) {
                operation.session_id = Some(session_id.to_string());
            };
        }
        if let Err(e) = self.client.cancel(session_id).await {
            warn!(%session_id, error = %e, "cancel request failed");
        }
    }

    /// Mutate the active operation if it is still `id`; `Cancelled` otherwise
    fn with_active<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut ActiveOperation) -> R,
    ) -> OperationResult<R> {
        let mut state = lock(&self.state);
        state
            .active
            .as_mut()
            .filter(|active| active.operation.id == id)
            .map(f)
            .ok_or(OperationError::Cancelled)
    }

    fn enter(&self, id: Uuid, status: OperationStatus) -> OperationResult<()> {
        self.with_active(id, |active| active.operation.status = status)?;
        info!(operation_id = %id, phase = %status, "phase");
        Ok(())
    }

    fn progress_callback(&self, id: Uuid) -> ProgressCallback {
        let state = self.state.clone();
        let notifier = self.notifier.clone();

        Arc::new(move |frame: &ProgressFrame| {
            let progress = {
                let mut state = lock(&state);
                match state.active.as_mut() {
                    Some(active) if active.operation.id == id => {
                        active.operation.progress.apply(frame);
                        active.operation.progress.clone()
                    }
                    _ => return,
                }
            };
            debug!(
                operation_id = %id,
                current = progress.current,
                total = progress.total,
                percentage = progress.percentage,
                "progress"
            );
            notifier.on_progress(id, &progress);
        })
    }

    async fn confirm(
        &self,
        op_type: OperationType,
        options: &OperationOptions,
        safety: &SafetyReport,
    ) -> OperationResult<()> {
        let confirmed = match options.confirmed {
            Some(answer) => answer,
            None => {
                let count = safety
                    .record_count(options)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "an unknown number of".to_string());
                let title = format!("Confirm bulk {op_type}");
                let message = format!(
                    "This will {op_type} {count} records in '{}'. Changes can only be reverted through a rollback request.",
                    options.target_label()
                );
                self.confirmer.confirm(&title, &message).await
            }
        };

        if confirmed {
            Ok(())
        } else {
            info!(%op_type, "destructive operation declined");
            Err(OperationError::CancelledByUser)
        }
    }

    async fn check_prerequisites(&self) -> OperationResult<()> {
        self.tokens
            .validate()
            .await
            .map_err(OperationError::Authentication)?;

        let timeout = self.config.latency_probe_timeout();
        match probe_latency(self.client.as_ref(), timeout).await {
            Some(latency) => {
                debug!(latency_ms = latency.as_millis() as u64, "directory service reachable");
                Ok(())
            }
            None => Err(OperationError::Network(format!(
                "directory service did not answer a health check within {} ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn complete(
        &self,
        id: Uuid,
        op_type: OperationType,
        completion: Completion,
    ) -> OperationResult<OperationOutcome> {
        let finalized = lock(&self.state).finalize(
            id,
            OperationStatus::Completed,
            Some(completion.report.clone()),
            None,
        );
        let Some(active) = finalized else {
            return Err(OperationError::Cancelled);
        };

        if active.audit_started {
            let entry = audit_entry(&active.operation, AuditStatus::Completed, active.checkpoint.as_ref())
                .with_affected(completion.report.affected(op_type));
            self.audit.record(entry).await;
        }

        let outcome = OperationOutcome {
            operation_id: id,
            op_type,
            session_id: completion.session_id,
            report: completion.report,
            warnings: completion.warnings,
            checkpoint_id: active
                .checkpoint
                .as_ref()
                .filter(|c| !c.is_degraded())
                .map(|c| c.id.clone()),
        };

        info!(
            operation_id = %id,
            affected = outcome.report.affected(op_type),
            warnings = outcome.warnings.len(),
            dry_run = outcome.report.dry_run,
            "operation completed"
        );
        self.notifier.on_event(&OperationEvent::Completed {
            outcome: outcome.clone(),
        });
        Ok(outcome)
    }

    async fn abort(
        &self,
        id: Uuid,
        op_type: OperationType,
        reason: OperationError,
    ) -> OperationResult<OperationOutcome> {
        let finalized = lock(&self.state).finalize(id, OperationStatus::Cancelled, None, None);
        if let Some(active) = finalized {
            self.record_cancellation(&active, &reason).await;
            self.notifier.on_event(&OperationEvent::Cancelled {
                operation_id: id,
                op_type,
            });
        }
        Err(reason)
    }

    async fn record_cancellation(&self, active: &ActiveOperation, reason: &OperationError) {
        info!(operation_id = %active.operation.id, %reason, "operation cancelled");
        if active.audit_started {
            let entry = audit_entry(&active.operation, AuditStatus::Failed, active.checkpoint.as_ref())
                .with_error(reason.to_string());
            self.audit.record(entry).await;
        }
    }

    async fn fail(
        &self,
        id: Uuid,
        op_type: OperationType,
        failure: OperationError,
    ) -> OperationResult<OperationOutcome> {
        let classification = classify(&failure);
        let finalized = lock(&self.state).finalize(
            id,
            OperationStatus::Failed,
            None,
            Some(failure.to_string()),
        );
        let Some(active) = finalized else {
            return Err(OperationError::Cancelled);
        };

        error!(
            operation_id = %id,
            operation_type = %op_type,
            category = %classification.category,
            error = %failure,
            "operation failed"
        );

        if active.audit_started {
            let entry = audit_entry(&active.operation, AuditStatus::Failed, active.checkpoint.as_ref())
                .with_error(failure.to_string());
            self.audit.record(entry).await;
        }

        if classification.hint.refresh_token {
            self.tokens.request_refresh();
        }

        let rollback = if classification.hint.offer_rollback && active.submitted {
            active
                .checkpoint
                .as_ref()
                .filter(|c| !c.is_degraded())
                .map(RollbackOffer::from)
        } else {
            None
        };

        let message = user_message(
            &classification,
            &failure.to_string(),
            self.config.show_error_details,
        );
        self.notifier.show_error(classification.hint.title, &message);
        self.notifier.on_event(&OperationEvent::Failed {
            operation_id: id,
            op_type,
            category: classification.category,
            message: failure.to_string(),
            rollback,
        });

        Err(failure)
    }

    /// Cooperatively cancel the running operation
    ///
    /// Sends a best-effort cancel request for the current session, then
    /// finalizes the operation as Cancelled. In-flight requests are not
    /// aborted; the running `start` call returns [`OperationError::Cancelled`]
    /// at its next suspension point. A session whose submission was still in
    /// flight is cancelled as soon as the submission returns.
    #[instrument(skip(self))]
    pub async fn cancel(&self) -> OperationResult<()> {
        let (id, op_type, session_id) = {
            let state = lock(&self.state);
            let active = state.active.as_ref().ok_or(OperationError::NotRunning)?;
            (
                active.operation.id,
                active.operation.op_type,
                active.operation.session_id.clone(),
            )
        };

        if let Some(session_id) = session_id.as_deref() {
            if let Err(e) = self.client.cancel(session_id).await {
                warn!(%session_id, error = %e, "cancel request failed");
            }
        }

        let finalized = lock(&self.state).finalize(id, OperationStatus::Cancelled, None, None);
        if let Some(active) = finalized {
            self.record_cancellation(&active, &OperationError::Cancelled)
                .await;
            self.notifier.on_event(&OperationEvent::Cancelled {
                operation_id: id,
                op_type,
            });
        }
        Ok(())
    }

    /// Ask the directory service to roll back to a saved checkpoint
    #[instrument(skip(self))]
    pub async fn rollback(&self, checkpoint_id: &str) -> OperationResult<RollbackResponse> {
        if let Some(running) = self.current().map(|op| op.op_type) {
            return Err(OperationError::Busy { running });
        }

        let checkpoint = self
            .checkpoints
            .get(checkpoint_id)
            .ok_or_else(|| OperationError::CheckpointNotFound(checkpoint_id.to_string()))?;

        info!(
            %checkpoint_id,
            operation_type = %checkpoint.operation_type,
            record_count = checkpoint.record_count,
            "requesting rollback"
        );
        let response = self.client.rollback(&checkpoint).await?;
        if !response.success {
            return Err(OperationError::Server(response.message.unwrap_or_else(|| {
                "rollback was not accepted by the directory service".to_string()
            })));
        }

        info!(%checkpoint_id, restored = ?response.restored_count, "rollback accepted");
        Ok(response)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).active.is_some()
    }

    /// Snapshot of the running operation
    pub fn current(&self) -> Option<Operation> {
        lock(&self.state)
            .active
            .as_ref()
            .map(|active| active.operation.clone())
    }

    /// Finished operations, newest first
    pub fn history(&self) -> Vec<Operation> {
        lock(&self.state).history.to_vec()
    }

    pub fn checkpoints(&self) -> Vec<RollbackCheckpoint> {
        self.checkpoints.list()
    }

    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit.entries()
    }
}
