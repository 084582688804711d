//! # Workflow status store
//!
//! Holds one [`StatusRecord`] per request. Readers always get a copy; the
//! only way to mutate a record is through the [`StatusWriter`] handed out
//! by [`StatusStore::register`], which the orchestrator keeps for the life
//! of the workflow.
//!
//! Each record sits behind its own lock, held only for a single copy or a
//! single transition, so concurrent workflows never contend with each other.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shared_types_rs::{
    OverallStatus, Request, StageEnvelope, StageName, StageRecord, StageStatus, StatusRecord,
};
use tracing::debug;

use crate::errors::StoreError;

type Slot = Arc<RwLock<StatusRecord>>;

fn read(slot: &Slot) -> RwLockReadGuard<'_, StatusRecord> {
    slot.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(slot: &Slot) -> RwLockWriteGuard<'_, StatusRecord> {
    slot.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct StatusStore {
    records: DashMap<String, Slot>,
    retention: Duration,
}

impl StatusStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            records: DashMap::new(),
            retention,
        }
    }

    /// Create the record for `request` and return its writer.
    ///
    /// Fails with `DuplicateRequest` while the id is in flight or its
    /// terminal record is still inside the retention window.
    pub fn register(&self, request: &Request) -> Result<StatusWriter, StoreError> {
        self.prune_expired();

        let id = request.id().to_string();
        let slot: Slot = Arc::new(RwLock::new(StatusRecord::new(id.clone())));

        match self.records.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                let reusable = {
                    let existing = read(entry.get());
                    existing.is_terminal() && self.is_expired(&existing)
                };
                if !reusable {
                    return Err(StoreError::DuplicateRequest(id));
                }
                entry.insert(slot.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(slot.clone());
            }
        }

        debug!(request_id = %id, "status record registered");
        Ok(StatusWriter {
            request_id: id,
            record: slot,
        })
    }

    /// Snapshot of one record.
    pub fn get(&self, request_id: &str) -> Result<StatusRecord, StoreError> {
        let slot = self
            .records
            .get(request_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(request_id.to_string()))?;
        let snapshot = read(&slot).clone();
        Ok(snapshot)
    }

    /// Snapshots of every record, oldest first.
    pub fn list(&self) -> Vec<StatusRecord> {
        let slots: Vec<Slot> = self.records.iter().map(|entry| entry.value().clone()).collect();
        let mut snapshots: Vec<StatusRecord> = slots.iter().map(|slot| read(slot).clone()).collect();
        snapshots.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });
        snapshots
    }

    /// Drop terminal records older than the retention window.
    pub fn prune_expired(&self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, slot| {
            let record = read(slot);
            !(record.is_terminal() && self.is_expired(&record))
        });
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            debug!(removed, "pruned expired status records");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn is_expired(&self, record: &StatusRecord) -> bool {
        Utc::now()
            .signed_duration_since(record.updated_at)
            .to_std()
            .map(|age| age >= self.retention)
            .unwrap_or(false)
    }
}

/// Exclusive mutation handle for one workflow's record.
///
/// Dropping a writer whose workflow never reached a terminal state marks it
/// failed, so an abandoned task cannot leave a record running forever.
#[derive(Debug)]
pub struct StatusWriter {
    request_id: String,
    record: Slot,
}

impl StatusWriter {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn snapshot(&self) -> StatusRecord {
        read(&self.record).clone()
    }

    fn update<F>(&self, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StatusRecord) -> Result<(), StoreError>,
    {
        let mut record = write(&self.record);
        if record.is_terminal() {
            return Err(StoreError::RecordSealed(self.request_id.clone()));
        }
        mutate(&mut record)?;
        record.updated_at = Utc::now();
        Ok(())
    }

    /// Mark `stage` running. Stages must start in pipeline order, each
    /// after its predecessor succeeded.
    pub fn stage_started(&self, stage: StageName) -> Result<(), StoreError> {
        self.update(|record| {
            let expected = match record.stage_history.last() {
                None => Some(StageName::Collector),
                Some(last) if last.status == StageStatus::Succeeded => last.stage_name.next(),
                Some(last) => {
                    return Err(StoreError::InvalidTransition {
                        stage,
                        message: format!("{} is still {:?}", last.stage_name, last.status),
                    })
                }
            };
            if expected != Some(stage) {
                return Err(StoreError::InvalidTransition {
                    stage,
                    message: format!("expected {:?} to start next", expected),
                });
            }

            record.stage_history.push(StageRecord {
                stage_name: stage,
                status: StageStatus::Running,
                started_at: Some(Utc::now()),
                ended_at: None,
                error_summary: None,
            });
            record.current_stage = Some(stage);
            Ok(())
        })
    }

    pub fn stage_succeeded(&self, stage: StageName) -> Result<(), StoreError> {
        self.update(|record| {
            let entry = running_entry(record, stage, StageStatus::Succeeded)?;
            entry.status = StageStatus::Succeeded;
            entry.ended_at = Some(Utc::now());
            Ok(())
        })
    }

    /// Mark `stage` failed and the workflow with it.
    pub fn stage_failed(&self, stage: StageName, summary: impl Into<String>) -> Result<(), StoreError> {
        let summary = summary.into();
        self.update(|record| {
            let entry = running_entry(record, stage, StageStatus::Failed)?;
            entry.status = StageStatus::Failed;
            entry.ended_at = Some(Utc::now());
            entry.error_summary = Some(summary.clone());
            record.overall_status = OverallStatus::Failed;
            record.terminal_reason = Some(format!("{} failed: {}", stage, summary));
            Ok(())
        })
    }

    /// Close the workflow with the reporter's envelope.
    pub fn complete(&self, result: StageEnvelope) -> Result<(), StoreError> {
        self.update(|record| {
            if record.stage_status(StageName::Reporter) != StageStatus::Succeeded {
                return Err(StoreError::InvalidTransition {
                    stage: StageName::Reporter,
                    message: "workflow cannot complete before the reporter succeeds".to_string(),
                });
            }
            record.overall_status = OverallStatus::Completed;
            record.result = Some(result);
            Ok(())
        })
    }

    /// End the workflow between stages. Stages not yet started stay pending.
    pub fn cancel(&self) -> Result<(), StoreError> {
        self.terminate("cancelled")
    }

    fn terminate(&self, reason: &str) -> Result<(), StoreError> {
        self.update(|record| {
            let now = Utc::now();
            for entry in record
                .stage_history
                .iter_mut()
                .filter(|r| r.status == StageStatus::Running)
            {
                entry.status = StageStatus::Failed;
                entry.ended_at = Some(now);
                entry.error_summary = Some(reason.to_string());
            }
            record.overall_status = OverallStatus::Failed;
            record.terminal_reason = Some(reason.to_string());
            Ok(())
        })
    }
}

fn running_entry(
    record: &mut StatusRecord,
    stage: StageName,
    next: StageStatus,
) -> Result<&mut StageRecord, StoreError> {
    let entry = record
        .stage_history
        .iter_mut()
        .find(|r| r.stage_name == stage)
        .ok_or_else(|| StoreError::InvalidTransition {
            stage,
            message: "stage was never started".to_string(),
        })?;
    if !entry.status.can_transition_to(next) {
        return Err(StoreError::InvalidTransition {
            stage,
            message: format!("cannot move from {:?} to {:?}", entry.status, next),
        });
    }
    Ok(entry)
}

impl Drop for StatusWriter {
    fn drop(&mut self) {
        if !read(&self.record).is_terminal() {
            let _ = self.terminate("aborted");
        }
    }
}
