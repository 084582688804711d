use crate::envelope::{StageEnvelope, StageName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl StageStatus {
    pub fn can_transition_to(self, next: StageStatus) -> bool {
        matches!(
            (self, next),
            (StageStatus::Pending, StageStatus::Running)
                | (StageStatus::Running, StageStatus::Succeeded)
                | (StageStatus::Running, StageStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StageStatus::Succeeded | StageStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Running,
    Completed,
    Failed,
}

impl OverallStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OverallStatus::Running)
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverallStatus::Running => "running",
            OverallStatus::Completed => "completed",
            OverallStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One entry of a workflow's stage history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage_name: StageName,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error_summary: Option<String>,
}

/// Progress of one workflow as seen by status readers.
///
/// `stage_history` only contains stages that were started; use
/// [`StatusRecord::stage_status`] to get `Pending` for the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub request_id: String,
    pub current_stage: Option<StageName>,
    pub stage_history: Vec<StageRecord>,
    pub overall_status: OverallStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub terminal_reason: Option<String>,
    pub result: Option<StageEnvelope>,
}

impl StatusRecord {
    pub fn new(request_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            request_id: request_id.into(),
            current_stage: None,
            stage_history: Vec::new(),
            overall_status: OverallStatus::Running,
            created_at: now,
            updated_at: now,
            terminal_reason: None,
            result: None,
        }
    }

    pub fn stage_status(&self, stage: StageName) -> StageStatus {
        self.stage_history
            .iter()
            .find(|r| r.stage_name == stage)
            .map(|r| r.status)
            .unwrap_or(StageStatus::Pending)
    }

    pub fn stage_record(&self, stage: StageName) -> Option<&StageRecord> {
        self.stage_history.iter().find(|r| r.stage_name == stage)
    }

    pub fn is_terminal(&self) -> bool {
        self.overall_status.is_terminal()
    }

    /// Fraction of stages that succeeded, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        let done = self
            .stage_history
            .iter()
            .filter(|r| r.status == StageStatus::Succeeded)
            .count();
        done as f64 / StageName::ALL.len() as f64
    }
}
