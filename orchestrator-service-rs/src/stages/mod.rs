//! # Stage workers
//!
//! The pipeline has exactly four stages, so workers are a closed enum
//! rather than trait objects. Each worker turns the previous envelope (and
//! the request) into its own payload; wrapping the payload into an
//! envelope and recording fallback use happens here, once, for all of them.

use std::sync::Arc;

use serde_json::Value;
use shared_types_rs::{Request, StageEnvelope, StageName, StagePayload};
use tool_sdk::ToolAccess;

use crate::errors::StageError;
use crate::settings::PipelineSettings;

pub mod action;
pub mod collector;
pub mod processor;
pub mod reporter;

pub use action::{ActionWorker, PlannedAction};
pub use collector::CollectorWorker;
pub use processor::ProcessorWorker;
pub use reporter::ReporterWorker;

/// What a stage receives: the request plus the previous stage's envelope.
#[derive(Debug, Clone)]
pub struct StageInput<'a> {
    pub request: &'a Request,
    pub previous: Option<Arc<StageEnvelope>>,
}

impl<'a> StageInput<'a> {
    pub fn new(request: &'a Request, previous: Option<Arc<StageEnvelope>>) -> Self {
        Self { request, previous }
    }

    /// The previous envelope, which must exist for every stage but the first.
    pub fn previous(&self) -> Result<&StageEnvelope, StageError> {
        self.previous
            .as_deref()
            .ok_or_else(|| StageError::InvalidInput("missing previous stage envelope".to_string()))
    }
}

#[derive(Debug, Clone)]
pub enum StageWorker {
    Collector(CollectorWorker),
    Processor(ProcessorWorker),
    Action(ActionWorker),
    Reporter(ReporterWorker),
}

impl StageWorker {
    /// The four workers in pipeline order.
    pub fn pipeline(settings: &PipelineSettings) -> [StageWorker; 4] {
        [
            StageWorker::Collector(CollectorWorker::new(settings.max_sources, settings.min_relevance)),
            StageWorker::Processor(ProcessorWorker::new()),
            StageWorker::Action(ActionWorker::new()),
            StageWorker::Reporter(ReporterWorker::new(settings.report_formats.clone())),
        ]
    }

    pub fn stage(&self) -> StageName {
        match self {
            StageWorker::Collector(_) => StageName::Collector,
            StageWorker::Processor(_) => StageName::Processor,
            StageWorker::Action(_) => StageName::Action,
            StageWorker::Reporter(_) => StageName::Reporter,
        }
    }

    pub async fn execute(
        &self,
        input: &StageInput<'_>,
        tools: &ToolAccess,
    ) -> Result<StageEnvelope, StageError> {
        let payload = match self {
            StageWorker::Collector(worker) => worker.execute(input, tools).await?,
            StageWorker::Processor(worker) => worker.execute(input, tools).await?,
            StageWorker::Action(worker) => worker.execute(input, tools).await?,
            StageWorker::Reporter(worker) => worker.execute(input, tools).await?,
        };

        Ok(StageEnvelope::new(
            self.stage(),
            payload,
            tools.used_fallback(),
            input.previous.clone(),
        ))
    }
}

/// Payload of a stage that must already be in the envelope chain.
pub(crate) fn expect_payload<'e>(
    envelope: &'e StageEnvelope,
    stage: StageName,
) -> Result<&'e StagePayload, StageError> {
    envelope
        .find(stage)
        .map(|e| &e.payload)
        .ok_or_else(|| StageError::InvalidInput(format!("no {} envelope in the chain", stage)))
}

/// String field of a capability result.
pub(crate) fn str_field<'v>(data: &'v Value, key: &str) -> Option<&'v str> {
    data.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}
