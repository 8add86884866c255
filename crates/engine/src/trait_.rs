//! Engine client abstractions.

use async_trait::async_trait;
use courier_core::{JobId, JobRecord, StageId, StageRecord, TaskId, TaskRecord, TaskStatus};
use serde_json::Value;

use crate::spec::{JobSpec, StageSpec, TaskSpec};

/// Error type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur when talking to the job engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine could not be reached
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The engine refused the request
    #[error("rejected: {0}")]
    Rejected(String),

    /// The entity is not in a state that allows the operation
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record conversion error
    #[error("model error: {0}")]
    Model(#[from] courier_core::ModelError),
}

/// Worker-side view of the job engine.
///
/// Implementations serialize metadata updates per entity; concurrent updates
/// to the same entity are last-write-wins.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Check that the engine is reachable.
    async fn ping(&self) -> Result<()>;

    // === Task claims ===

    /// Claim the oldest pending task of a stage type, if any.
    ///
    /// Claiming counts as an attempt and moves the task to `InProgress`.
    async fn dequeue(&self, stage_type: &str) -> Result<Option<TaskRecord>>;

    /// Hand back a claimed task that was never dispatched.
    async fn release(&self, task_id: TaskId) -> Result<()>;

    /// Record a successful attempt.
    async fn complete(&self, task_id: TaskId) -> Result<()>;

    /// Record a failed attempt. Returns the status the engine moved the task to.
    async fn fail(&self, task_id: TaskId, reason: &str) -> Result<TaskStatus>;

    // === Snapshots ===

    /// Load a job.
    async fn get_job(&self, id: JobId) -> Result<JobRecord>;

    /// Load a stage.
    async fn get_stage(&self, id: StageId) -> Result<StageRecord>;

    // === Metadata updates (partial merge) ===

    /// Merge a partial update into a job's user metadata.
    async fn update_job_user_metadata(&self, id: JobId, patch: Value) -> Result<()>;

    /// Merge a partial update into a stage's user metadata.
    async fn update_stage_user_metadata(&self, id: StageId, patch: Value) -> Result<()>;

    /// Merge a partial update into a task's user metadata.
    async fn update_task_user_metadata(&self, id: TaskId, patch: Value) -> Result<()>;
}

/// Producer-side view of the job engine.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Create a job.
    async fn create_job(&self, spec: JobSpec) -> Result<JobRecord>;

    /// Create a stage under a job.
    async fn create_stage(&self, job_id: JobId, spec: StageSpec) -> Result<StageRecord>;

    /// Create tasks under a stage. `stage_type` must match the stage.
    async fn create_tasks(
        &self,
        stage_id: StageId,
        stage_type: &str,
        specs: Vec<TaskSpec>,
    ) -> Result<Vec<TaskRecord>>;
}
