//! Stage model - ordered phases of a job.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::id::{JobId, StageId};
use crate::kind::StageKind;
use crate::metadata::decode_payload;
use crate::status::{StageStatus, TaskStatus};

/// A stage as stored by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage<D = Value, M = Value> {
    /// Unique identifier
    pub id: StageId,

    /// Owning job
    pub job_id: JobId,

    /// Stage type discriminant
    #[serde(rename = "type")]
    pub stage_type: String,

    /// Position within the job
    pub order: u32,

    /// Current status (owned by the engine)
    pub status: StageStatus,

    /// Task counts per status
    pub summary: StageSummary,

    /// Immutable stage data
    pub data: D,

    /// Handler-owned metadata
    pub user_metadata: M,

    /// W3C trace context of the producer, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceparent: Option<String>,
}

/// Type-erased stage record.
pub type StageRecord = Stage;

/// Typed view of a stage of kind `S`.
pub type StageOf<S> = Stage<<S as StageKind>::Data, <S as StageKind>::UserMetadata>;

impl StageRecord {
    /// Decode the record as a stage of kind `S`.
    pub fn decode<S: StageKind>(&self) -> Result<StageOf<S>> {
        if self.stage_type != S::NAME {
            return Err(ModelError::KindMismatch {
                entity: "stage",
                expected: S::NAME,
                found: self.stage_type.clone(),
            });
        }

        Ok(Stage {
            id: self.id,
            job_id: self.job_id,
            stage_type: self.stage_type.clone(),
            order: self.order,
            status: self.status,
            summary: self.summary,
            data: decode_payload(&self.data, "data")?,
            user_metadata: decode_payload(&self.user_metadata, "userMetadata")?,
            traceparent: self.traceparent.clone(),
        })
    }
}

/// Count of a stage's tasks in each status.
///
/// `total` always equals the sum of the other counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSummary {
    /// Waiting to be claimed
    pub pending: u32,
    /// Claimed by a worker
    pub in_progress: u32,
    /// Finished successfully
    pub completed: u32,
    /// Attempts exhausted
    pub failed: u32,
    /// Created but not yet queued
    pub created: u32,
    /// Waiting to be requeued after a failed attempt
    pub retried: u32,
    /// All tasks of the stage
    pub total: u32,
}

impl StageSummary {
    /// Count a newly created task.
    pub fn add(&mut self, status: TaskStatus) {
        *self.bucket(status) += 1;
        self.total += 1;
    }

    /// Move one task from `from` to `to`.
    pub fn transition(&mut self, from: TaskStatus, to: TaskStatus) {
        if from == to {
            return;
        }
        let source = self.bucket(from);
        *source = source.saturating_sub(1);
        *self.bucket(to) += 1;
    }

    /// Whether `total` matches the per-status counters.
    pub fn is_consistent(&self) -> bool {
        self.total
            == self.pending
                + self.in_progress
                + self.completed
                + self.failed
                + self.created
                + self.retried
    }

    /// Whether every task of the stage has completed.
    pub fn is_done(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }

    fn bucket(&mut self, status: TaskStatus) -> &mut u32 {
        match status {
            TaskStatus::Created => &mut self.created,
            TaskStatus::Pending => &mut self.pending,
            TaskStatus::InProgress => &mut self.in_progress,
            TaskStatus::Completed => &mut self.completed,
            TaskStatus::Failed => &mut self.failed,
            TaskStatus::Retried => &mut self.retried,
        }
    }
}
