//! Data model shared by the pipeline crates.
//!
//! Everything in here is plain data: requests, the immutable envelopes that
//! flow between stages, and the status records served to pollers.

pub mod envelope;
pub mod request;
pub mod status;

pub use envelope::{
    ActionOutcome, ActionStatus, CollectedSource, DeliveryResult, DeliveryStatus, Findings, KeywordCount,
    StageEnvelope, StageName, StagePayload,
};
pub use request::{generate_request_id, Request, RequestError};
pub use status::{OverallStatus, StageRecord, StageStatus, StatusRecord};

pub type Result<T> = std::result::Result<T, RequestError>;
