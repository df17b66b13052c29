//! Shared fixtures for bulkops integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Notify;

use bulkops::client::FrameStream;
use bulkops::collaborators::Confirmer;
use bulkops::models::{
    AuditTrailEntry, Collection, ProgressFrame, RollbackResponse, SubmitResponse,
};
use bulkops::{
    AuditEntry, AuditSink, ClientError, ClientResult, DirectoryClient, FixedConfirmer,
    MemoryStore, Notifier, NullAuditSink, OperationEvent, OperationOptions, OperationReport,
    OperationType, Orchestrator, OrchestratorConfig, Progress, RollbackCheckpoint,
    TokenValidator,
};
use uuid::Uuid;

// =============================================================================
// Directory service double
// =============================================================================

/// Call counters, one per client method
#[derive(Debug, Default)]
pub struct Calls {
    pub submit: AtomicUsize,
    pub progress: AtomicUsize,
    pub open_stream: AtomicUsize,
    pub cancel: AtomicUsize,
    pub rollback: AtomicUsize,
    pub lookup: AtomicUsize,
    pub ping: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Scripted in-process directory service
pub struct MockDirectory {
    pub submit_reply: ClientResult<SubmitResponse>,
    /// When set, `submit` waits for a notification before replying
    pub submit_gate: Option<Arc<Notify>>,
    pub collection: Option<Collection>,
    pub ping_ok: bool,
    /// Items served by the push stream; `None` disables streaming
    pub stream: Mutex<Option<Vec<ClientResult<ProgressFrame>>>>,
    /// Replies served by the status endpoint, in order
    pub polls: Mutex<VecDeque<ClientResult<ProgressFrame>>>,
    /// Reply once `polls` is exhausted
    pub idle_frame: ProgressFrame,
    pub rollback_reply: RollbackResponse,
    pub payloads: Mutex<Vec<(OperationType, Value)>>,
    pub calls: Calls,
}

impl Default for MockDirectory {
    fn default() -> Self {
        Self {
            submit_reply: Ok(SubmitResponse::accepted("session-1")),
            submit_gate: None,
            collection: Some(contractors(10)),
            ping_ok: true,
            stream: Mutex::new(None),
            polls: Mutex::new(VecDeque::new()),
            idle_frame: ProgressFrame::completed(10, OperationReport::default()),
            rollback_reply: RollbackResponse {
                success: true,
                restored_count: Some(10),
                message: None,
            },
            payloads: Mutex::new(Vec::new()),
            calls: Calls::default(),
        }
    }
}

impl MockDirectory {
    /// Service that finishes every session with `report`
    pub fn completing_with(report: OperationReport) -> Self {
        Self {
            idle_frame: ProgressFrame::completed(10, report),
            ..Default::default()
        }
    }

    pub fn with_polls(self, replies: Vec<ClientResult<ProgressFrame>>) -> Self {
        *self.polls.lock().unwrap() = replies.into();
        self
    }

    pub fn with_stream(self, items: Vec<ClientResult<ProgressFrame>>) -> Self {
        *self.stream.lock().unwrap() = Some(items);
        self
    }

    pub fn with_submit_reply(mut self, reply: ClientResult<SubmitResponse>) -> Self {
        self.submit_reply = reply;
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.submit_gate = Some(gate);
        self
    }

    /// Sessions never finish on their own
    pub fn never_finishing(mut self) -> Self {
        self.idle_frame = ProgressFrame::running(3, 10, "working");
        self
    }
}

#[async_trait]
impl DirectoryClient for MockDirectory {
    async fn submit(&self, op_type: OperationType, payload: &Value) -> ClientResult<SubmitResponse> {
        self.calls.submit.fetch_add(1, Ordering::SeqCst);
        self.payloads
            .lock()
            .unwrap()
            .push((op_type, payload.clone()));
        if let Some(gate) = &self.submit_gate {
            gate.notified().await;
        }
        self.submit_reply.clone()
    }

    async fn progress(&self, _session_id: &str) -> ClientResult<ProgressFrame> {
        self.calls.progress.fetch_add(1, Ordering::SeqCst);
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.idle_frame.clone()))
    }

    fn supports_streaming(&self) -> bool {
        self.stream.lock().unwrap().is_some()
    }

    async fn open_stream(&self, session_id: &str) -> ClientResult<FrameStream> {
        self.calls.open_stream.fetch_add(1, Ordering::SeqCst);
        match self.stream.lock().unwrap().take() {
            Some(items) => Ok(futures::stream::iter(items).boxed()),
            None => Err(ClientError::Network(format!("no stream for {session_id}"))),
        }
    }

    async fn cancel(&self, _session_id: &str) -> ClientResult<()> {
        self.calls.cancel.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, _checkpoint: &RollbackCheckpoint) -> ClientResult<RollbackResponse> {
        self.calls.rollback.fetch_add(1, Ordering::SeqCst);
        Ok(self.rollback_reply.clone())
    }

    async fn get_collection(&self, collection_id: &str) -> ClientResult<Collection> {
        self.calls.lookup.fetch_add(1, Ordering::SeqCst);
        self.collection.clone().ok_or_else(|| ClientError::Api {
            status: 404,
            message: format!("population {collection_id} not found"),
        })
    }

    async fn ping(&self) -> ClientResult<()> {
        self.calls.ping.fetch_add(1, Ordering::SeqCst);
        if self.ping_ok {
            Ok(())
        } else {
            Err(ClientError::Network("connection refused".to_string()))
        }
    }
}

// =============================================================================
// Collaborators
// =============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    pub errors: Mutex<Vec<(String, String)>>,
    pub events: Mutex<Vec<OperationEvent>>,
    pub percentages: Mutex<Vec<u8>>,
}

impl RecordingNotifier {
    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }

    pub fn events(&self) -> Vec<OperationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn percentages(&self) -> Vec<u8> {
        self.percentages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn show_error(&self, title: &str, message: &str) {
        self.errors
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }

    fn on_event(&self, event: &OperationEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn on_progress(&self, _operation_id: Uuid, progress: &Progress) {
        self.percentages.lock().unwrap().push(progress.percentage);
    }
}

pub struct TestTokens {
    pub valid: bool,
    pub refreshes: AtomicUsize,
}

impl TestTokens {
    pub fn valid() -> Arc<Self> {
        Arc::new(Self {
            valid: true,
            refreshes: AtomicUsize::new(0),
        })
    }

    pub fn expired() -> Arc<Self> {
        Arc::new(Self {
            valid: false,
            refreshes: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TokenValidator for TestTokens {
    async fn validate(&self) -> Result<(), String> {
        if self.valid {
            Ok(())
        } else {
            Err("token expired".to_string())
        }
    }

    fn request_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Audit sink whose remote endpoint is always down
pub struct FailingSink;

#[async_trait]
impl AuditSink for FailingSink {
    async fn mirror(&self, _entry: &AuditEntry) -> ClientResult<()> {
        Err(ClientError::Network("audit endpoint unreachable".to_string()))
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Setup {
    pub config: OrchestratorConfig,
    pub confirmer: Arc<dyn Confirmer>,
    pub tokens: Arc<TestTokens>,
    pub audit_sink: Arc<dyn AuditSink>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            config: test_config(),
            confirmer: Arc::new(FixedConfirmer(true)),
            tokens: TestTokens::valid(),
            audit_sink: Arc::new(NullAuditSink),
        }
    }
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub client: Arc<MockDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub tokens: Arc<TestTokens>,
}

pub fn harness(client: MockDirectory) -> Harness {
    harness_with(client, Setup::default())
}

/// Route orchestrator logs to the test writer; `RUST_LOG` narrows them
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bulkops=debug")),
        )
        .try_init();
}

pub fn harness_with(client: MockDirectory, setup: Setup) -> Harness {
    init_test_logging();
    let client = Arc::new(client);
    let notifier = Arc::new(RecordingNotifier::default());

    let orchestrator = Orchestrator::builder(setup.config, client.clone())
        .token_validator(setup.tokens.clone())
        .confirmer(setup.confirmer)
        .notifier(notifier.clone())
        .store(Arc::new(MemoryStore::new()))
        .audit_sink(setup.audit_sink)
        .build()
        .expect("orchestrator should build");

    Harness {
        orchestrator: Arc::new(orchestrator),
        client,
        notifier,
        tokens: setup.tokens,
    }
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        api_token: Some("test-token".to_string()),
        poll_interval_ms: 5,
        max_poll_failures: 2,
        latency_probe_timeout_ms: 500,
        audit_mirror_timeout_ms: 200,
        ..Default::default()
    }
}

// =============================================================================
// Data factories
// =============================================================================

pub fn contractors(size: u64) -> Collection {
    Collection {
        id: "pop-1".to_string(),
        name: "Contractors".to_string(),
        user_count: Some(size),
    }
}

pub fn delete_options(count: u64) -> OperationOptions {
    OperationOptions::for_population("pop-1")
        .with_population_name("Contractors")
        .with_user_count(count)
}

pub fn deleted_report(deleted: u64) -> OperationReport {
    OperationReport {
        processed: deleted,
        deleted_count: Some(deleted),
        ..Default::default()
    }
}

pub fn critical_entry(message: &str) -> AuditTrailEntry {
    AuditTrailEntry {
        level: "error".to_string(),
        message: message.to_string(),
        critical: true,
    }
}

pub fn running(percentage: u8) -> ClientResult<ProgressFrame> {
    Ok(ProgressFrame {
        current: percentage as u64,
        total: 100,
        percentage,
        message: format!("{percentage}%"),
        ..Default::default()
    })
}

/// Wait until `condition` holds, yielding to other tasks in between
pub async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
