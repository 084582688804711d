//! Error types for the orchestrator.
//!
//! `StageError` is what a worker returns; `OrchestrationError` is what
//! callers of the orchestrator see; `StoreError` covers status bookkeeping.

use std::time::Duration;

use shared_types_rs::{RequestError, StageName};
use thiserror::Error;
use tool_sdk::ServiceError;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("capability '{capability}' unavailable: {reason}")]
    CapabilityUnavailable { capability: String, reason: String },

    #[error("stage timed out after {0:?}")]
    Timeout(Duration),

    #[error("none of the {attempted} planned actions succeeded")]
    NoActionSucceeded { attempted: usize },

    #[error("no usable sources: {0}")]
    NoSources(String),

    #[error("artifact generation failed: {0}")]
    ArtifactGeneration(String),

    #[error("invalid stage input: {0}")]
    InvalidInput(String),

    #[error("malformed result from '{capability}': {message}")]
    MalformedResult { capability: String, message: String },

    #[error("tool error: {0}")]
    Tool(ServiceError),
}

impl StageError {
    pub fn malformed(capability: impl Into<String>, message: impl Into<String>) -> Self {
        StageError::MalformedResult {
            capability: capability.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable tag used in logs and status summaries
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::CapabilityUnavailable { .. } => "capability_unavailable",
            StageError::Timeout(_) => "timeout",
            StageError::NoActionSucceeded { .. } => "no_action_succeeded",
            StageError::NoSources(_) => "no_sources",
            StageError::ArtifactGeneration(_) => "artifact_generation",
            StageError::InvalidInput(_) => "invalid_input",
            StageError::MalformedResult { .. } => "malformed_result",
            StageError::Tool(_) => "tool_error",
        }
    }

    /// Whether rerunning the workflow could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            StageError::CapabilityUnavailable { .. } | StageError::Timeout(_) => true,
            StageError::Tool(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl From<ServiceError> for StageError {
    fn from(err: ServiceError) -> Self {
        match err.root() {
            ServiceError::CapabilityUnavailable { capability, reason } => StageError::CapabilityUnavailable {
                capability: capability.clone(),
                reason: reason.clone(),
            },
            _ => StageError::Tool(err),
        }
    }
}

#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("request '{0}' is already registered")]
    DuplicateRequest(String),

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("no workflow with id '{0}'")]
    NotFound(String),

    #[error("stage {stage} failed: {source}")]
    StageFailure {
        stage: StageName,
        #[source]
        source: StageError,
    },

    #[error("workflow '{0}' was cancelled")]
    Cancelled(String),

    #[error("workflow task failed: {0}")]
    Join(String),

    #[error("status store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for OrchestrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateRequest(id) => OrchestrationError::DuplicateRequest(id),
            StoreError::NotFound(id) => OrchestrationError::NotFound(id),
            other => OrchestrationError::Store(other),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("request '{0}' is already registered")]
    DuplicateRequest(String),

    #[error("no status record for '{0}'")]
    NotFound(String),

    #[error("status record for '{0}' is terminal")]
    RecordSealed(String),

    #[error("invalid transition for {stage}: {message}")]
    InvalidTransition { stage: StageName, message: String },
}

pub type Result<T> = std::result::Result<T, OrchestrationError>;
