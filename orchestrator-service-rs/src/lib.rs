//! # Orchestrator service
//!
//! Runs research requests through the four-stage pipeline
//! (collector → processor → action → reporter) on top of the tool SDK.
//!
//! - `WorkflowOrchestrator`: fail-fast sequential driver, sync or background
//! - `StageWorker`: the closed set of stage implementations
//! - `StatusStore`: snapshot-only status reads, single-writer updates
//! - `PipelineSettings` / `logging`: the service's configuration surface
//! - `server`: axum routes for submitting and inspecting workflows

pub mod errors;
pub use errors::{OrchestrationError, StageError, StoreError};

pub mod settings;
pub use settings::{PipelineSettings, ReportFormat};

pub mod logging;
pub use logging::{init_logging, LoggingConfig};

pub mod status_store;
pub use status_store::{StatusStore, StatusWriter};

pub mod stages;
pub use stages::{StageInput, StageWorker};

pub mod orchestrator;
pub use orchestrator::{SubmitRequest, WorkflowHandle, WorkflowOrchestrator};

pub mod server;
pub use server::{router, serve};

#[cfg(test)]
mod tests {
    pub mod stage_worker_tests;
}
