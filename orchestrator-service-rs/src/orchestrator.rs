//! # Workflow orchestrator
//!
//! Drives one request through the four stages in order. A stage failure
//! stops the workflow immediately; later stages are never started and stay
//! pending in the status record. Retries live in the tool layer, never
//! here.
//!
//! Workflows for different requests run concurrently and share only the
//! resolver (and through it the immutable registry) and the status store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use shared_types_rs::{Request, StageEnvelope, StageName, StatusRecord};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tool_sdk::{
    ConfigProvider, FallbackResolver, ServiceError, ToolAccess, ToolRegistry,
};
use tracing::{error, info, warn};

use crate::errors::{OrchestrationError, Result, StageError};
use crate::settings::PipelineSettings;
use crate::stages::{StageInput, StageWorker};
use crate::status_store::{StatusStore, StatusWriter};

/// A request as submitted by a caller, before validation.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub raw_text: String,
    pub id: Option<String>,
}

impl SubmitRequest {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A workflow running in the background.
#[derive(Debug)]
pub struct WorkflowHandle {
    pub request_id: String,
    join: JoinHandle<StatusRecord>,
}

impl WorkflowHandle {
    /// Wait for the workflow to reach a terminal state.
    pub async fn wait(self) -> Result<StatusRecord> {
        self.join
            .await
            .map_err(|e| OrchestrationError::Join(e.to_string()))
    }
}

#[derive(Serialize)]
struct CriticalFailureLog<'a> {
    event_type: &'static str,
    service: &'static str,
    stage: StageName,
    request_id: &'a str,
    error_type: &'static str,
    error_message: String,
    retryable: bool,
    elapsed_ms: u64,
}

struct Inner {
    resolver: Arc<FallbackResolver>,
    store: StatusStore,
    workers: [StageWorker; 4],
    settings: PipelineSettings,
    cancellations: DashMap<String, Arc<AtomicBool>>,
}

#[derive(Clone)]
pub struct WorkflowOrchestrator {
    inner: Arc<Inner>,
}

impl WorkflowOrchestrator {
    pub fn new(registry: ToolRegistry, settings: PipelineSettings) -> Self {
        let inner = Inner {
            resolver: Arc::new(FallbackResolver::new(Arc::new(registry))),
            store: StatusStore::new(settings.retention),
            workers: StageWorker::pipeline(&settings),
            settings,
            cancellations: DashMap::new(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Build the registry and settings from configuration.
    ///
    /// `settings` supplies endpoints, resilience and pipeline settings;
    /// `secrets` supplies credentials by their own names.
    pub fn from_providers(
        settings: &dyn ConfigProvider,
        secrets: &dyn ConfigProvider,
    ) -> std::result::Result<Self, ServiceError> {
        let pipeline = PipelineSettings::from_provider(settings)?;
        let registry = tool_sdk::default_registry()
            .endpoints_from(settings)
            .credentials_from(secrets)
            .resilience_from(settings)
            .build()?;
        Ok(Self::new(registry, pipeline))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.inner.settings
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.inner.resolver.registry()
    }

    pub fn resolver_metrics(&self) -> HashMap<String, String> {
        self.inner.resolver.metrics()
    }

    /// Run a validated request to completion on the current task.
    ///
    /// Stage failures are reported in the returned record, not as errors;
    /// only registration problems fail the call.
    pub async fn run(&self, request: Request) -> Result<StatusRecord> {
        let writer = self.inner.store.register(&request)?;
        let cancelled = self.inner.track(request.id());
        Ok(self.inner.execute(request, writer, cancelled).await)
    }

    /// Validate and register synchronously, then run in the background.
    pub fn submit(&self, submission: SubmitRequest) -> Result<WorkflowHandle> {
        let request = Request::new(submission.raw_text, submission.id)?;
        let writer = self.inner.store.register(&request)?;
        let cancelled = self.inner.track(request.id());

        let request_id = request.id().to_string();
        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(async move { inner.execute(request, writer, cancelled).await });

        Ok(WorkflowHandle { request_id, join })
    }

    pub fn status(&self, request_id: &str) -> Result<StatusRecord> {
        Ok(self.inner.store.get(request_id)?)
    }

    pub fn list_statuses(&self) -> Vec<StatusRecord> {
        self.inner.store.list()
    }

    /// Stop the workflow before its next stage starts.
    ///
    /// Returns `false` when the workflow already finished.
    pub fn cancel(&self, request_id: &str) -> Result<bool> {
        self.inner.store.get(request_id)?;
        match self.inner.cancellations.get(request_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                info!(request_id, "cancellation requested");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Inner {
    fn track(&self, request_id: &str) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.cancellations.insert(request_id.to_string(), flag.clone());
        flag
    }

    async fn execute(
        &self,
        request: Request,
        writer: StatusWriter,
        cancelled: Arc<AtomicBool>,
    ) -> StatusRecord {
        let started = Instant::now();
        info!(request_id = %request.id(), "workflow started");

        match self.drive(&request, &writer, &cancelled).await {
            Ok(()) => info!(
                request_id = %request.id(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "workflow completed"
            ),
            Err(OrchestrationError::Cancelled(_)) => warn!(
                request_id = %request.id(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "workflow cancelled"
            ),
            Err(err) => error!(
                request_id = %request.id(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %err,
                "workflow failed"
            ),
        }

        self.cancellations.remove(request.id());
        writer.snapshot()
    }

    async fn drive(
        &self,
        request: &Request,
        writer: &StatusWriter,
        cancelled: &AtomicBool,
    ) -> Result<()> {
        let mut previous: Option<Arc<StageEnvelope>> = None;

        for worker in &self.workers {
            let stage = worker.stage();
            if cancelled.load(Ordering::SeqCst) {
                writer.cancel()?;
                return Err(OrchestrationError::Cancelled(request.id().to_string()));
            }

            writer.stage_started(stage)?;
            info!(request_id = %request.id(), %stage, "stage started");
            let stage_started = Instant::now();

            let tools = ToolAccess::new(stage, Arc::clone(&self.resolver));
            let input = StageInput::new(request, previous.clone());
            let outcome = match timeout(self.settings.stage_timeout, worker.execute(&input, &tools)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(StageError::Timeout(self.settings.stage_timeout)),
            };
            let elapsed_ms = stage_started.elapsed().as_millis() as u64;

            match outcome {
                Ok(envelope) => {
                    writer.stage_succeeded(stage)?;
                    info!(
                        request_id = %request.id(),
                        %stage,
                        elapsed_ms,
                        used_fallback = ?envelope.used_fallback,
                        "stage succeeded"
                    );
                    previous = Some(Arc::new(envelope));
                }
                Err(err) => {
                    writer.stage_failed(stage, err.to_string())?;
                    log_critical_failure(request, stage, &err, elapsed_ms);
                    return Err(OrchestrationError::StageFailure { stage, source: err });
                }
            }
        }

        let result = previous.ok_or_else(|| {
            OrchestrationError::StageFailure {
                stage: StageName::Reporter,
                source: StageError::InvalidInput("pipeline produced no envelope".to_string()),
            }
        })?;
        writer.complete(Arc::try_unwrap(result).unwrap_or_else(|shared| (*shared).clone()))?;
        Ok(())
    }
}

fn log_critical_failure(request: &Request, stage: StageName, err: &StageError, elapsed_ms: u64) {
    let event = CriticalFailureLog {
        event_type: "CRITICAL_FAILURE",
        service: "orchestrator-service",
        stage,
        request_id: request.id(),
        error_type: err.kind(),
        error_message: err.to_string(),
        retryable: err.is_retryable(),
        elapsed_ms,
    };

    match serde_json::to_string(&event) {
        Ok(json) => error!(request_id = %request.id(), %stage, "{}", json),
        Err(_) => error!(
            request_id = %request.id(),
            %stage,
            error_type = err.kind(),
            error = %err,
            "CRITICAL_FAILURE"
        ),
    }
}
