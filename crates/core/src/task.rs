//! Task model - the atomic unit of work a worker claims.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::id::{StageId, TaskId};
use crate::kind::StageKind;
use crate::metadata::decode_payload;
use crate::status::TaskStatus;
use crate::Time;

/// Default ceiling on attempts per task.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// A task as stored by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task<D = Value, M = Value> {
    /// Unique identifier
    pub id: TaskId,

    /// Owning stage
    pub stage_id: StageId,

    /// Current status (owned by the engine)
    pub status: TaskStatus,

    /// Attempts made so far
    pub attempts: u32,

    /// Attempt ceiling, `attempts <= max_attempts`
    pub max_attempts: u32,

    /// Creation timestamp
    pub creation_time: Time,

    /// Immutable task data
    pub data: D,

    /// Handler-owned metadata
    #[serde(default)]
    pub user_metadata: M,

    /// W3C trace context of the producer, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceparent: Option<String>,
}

/// Type-erased task record.
pub type TaskRecord = Task;

/// Typed view of a task belonging to a stage of kind `S`.
pub type TaskOf<S> = Task<<S as StageKind>::TaskData, <S as StageKind>::TaskUserMetadata>;

impl<D, M> Task<D, M> {
    /// Whether another attempt is allowed after the current one fails.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

impl TaskRecord {
    /// Decode the record as a task of a stage of kind `S`.
    ///
    /// Tasks carry no discriminant of their own; the caller is expected to
    /// have checked the owning stage.
    pub fn decode<S: StageKind>(&self) -> Result<TaskOf<S>> {
        Ok(Task {
            id: self.id,
            stage_id: self.stage_id,
            status: self.status,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            creation_time: self.creation_time,
            data: decode_payload(&self.data, "data")?,
            user_metadata: decode_payload(&self.user_metadata, "userMetadata")?,
            traceparent: self.traceparent.clone(),
        })
    }
}
