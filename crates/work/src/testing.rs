//! Test doubles for handler tests.
//!
//! [`RecordingClient`] stands in for the engine and records every metadata
//! update; the `fake_*` builders produce records the way the engine would
//! hand them to a handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use courier_core::{
    Job, JobId, JobKind, JobOf, JobRecord, JobStatus, Priority, Stage, StageId, StageKind, StageOf,
    StageRecord, StageStatus, StageSummary, Task, TaskId, TaskOf, TaskRecord, TaskStatus,
    DEFAULT_MAX_ATTEMPTS,
};
use courier_engine::{EngineClient, EngineError, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::context::TaskHandlerContext;

/// A metadata update seen by [`RecordingClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataUpdate {
    /// Job metadata patch
    Job(JobId, Value),
    /// Stage metadata patch
    Stage(StageId, Value),
    /// Task metadata patch
    Task(TaskId, Value),
}

/// Engine fake that records metadata updates and serves no tasks.
#[derive(Default)]
pub struct RecordingClient {
    updates: Mutex<Vec<MetadataUpdate>>,
    reject: AtomicBool,
}

impl RecordingClient {
    /// Create a client that accepts every update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client that refuses every update.
    pub fn rejecting() -> Self {
        let client = Self::default();
        client.reject.store(true, Ordering::SeqCst);
        client
    }

    /// All updates, in order.
    pub fn updates(&self) -> Vec<MetadataUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of updates recorded.
    pub fn update_count(&self) -> usize {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stage metadata patches, in order.
    pub fn stage_updates(&self) -> Vec<Value> {
        self.updates()
            .into_iter()
            .filter_map(|update| match update {
                MetadataUpdate::Stage(_, patch) => Some(patch),
                _ => None,
            })
            .collect()
    }

    /// Task metadata patches, in order.
    pub fn task_updates(&self) -> Vec<Value> {
        self.updates()
            .into_iter()
            .filter_map(|update| match update {
                MetadataUpdate::Task(_, patch) => Some(patch),
                _ => None,
            })
            .collect()
    }

    fn record(&self, update: MetadataUpdate) -> Result<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(EngineError::Rejected("metadata update refused".to_string()));
        }
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(update);
        Ok(())
    }
}

#[async_trait]
impl EngineClient for RecordingClient {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn dequeue(&self, _stage_type: &str) -> Result<Option<TaskRecord>> {
        Ok(None)
    }

    async fn release(&self, _task_id: TaskId) -> Result<()> {
        Ok(())
    }

    async fn complete(&self, _task_id: TaskId) -> Result<()> {
        Ok(())
    }

    async fn fail(&self, _task_id: TaskId, _reason: &str) -> Result<TaskStatus> {
        Ok(TaskStatus::Failed)
    }

    async fn get_job(&self, id: JobId) -> Result<JobRecord> {
        Err(EngineError::NotFound(format!("job {}", id)))
    }

    async fn get_stage(&self, id: StageId) -> Result<StageRecord> {
        Err(EngineError::NotFound(format!("stage {}", id)))
    }

    async fn update_job_user_metadata(&self, id: JobId, patch: Value) -> Result<()> {
        self.record(MetadataUpdate::Job(id, patch))
    }

    async fn update_stage_user_metadata(&self, id: StageId, patch: Value) -> Result<()> {
        self.record(MetadataUpdate::Stage(id, patch))
    }

    async fn update_task_user_metadata(&self, id: TaskId, patch: Value) -> Result<()> {
        self.record(MetadataUpdate::Task(id, patch))
    }
}

/// An in-progress job of kind `J`.
pub fn fake_job<J: JobKind>(data: J::Data, user_metadata: J::UserMetadata) -> JobOf<J> {
    Job {
        id: JobId::new(),
        name: J::NAME.to_string(),
        status: JobStatus::InProgress,
        priority: Priority::default(),
        creation_time: chrono::Utc::now(),
        data,
        user_metadata,
        traceparent: None,
    }
}

/// An in-progress stage of kind `S` with one claimed task.
pub fn fake_stage<S: StageKind>(
    job_id: JobId,
    data: S::Data,
    user_metadata: S::UserMetadata,
) -> StageOf<S> {
    let mut summary = StageSummary::default();
    summary.add(TaskStatus::InProgress);

    Stage {
        id: StageId::new(),
        job_id,
        stage_type: S::NAME.to_string(),
        order: 1,
        status: StageStatus::InProgress,
        summary,
        data,
        user_metadata,
        traceparent: None,
    }
}

/// A claimed task of a stage of kind `S`, on its first attempt.
pub fn fake_task<S: StageKind>(stage_id: StageId, data: S::TaskData) -> TaskOf<S> {
    Task {
        id: TaskId::new(),
        stage_id,
        status: TaskStatus::InProgress,
        attempts: 1,
        max_attempts: DEFAULT_MAX_ATTEMPTS,
        creation_time: chrono::Utc::now(),
        data,
        user_metadata: S::TaskUserMetadata::default(),
        traceparent: None,
    }
}

/// Handler context over the given snapshots, with a fresh termination signal.
pub fn fake_context<J: JobKind, S: StageKind>(
    job: JobOf<J>,
    stage: StageOf<S>,
    task: &TaskOf<S>,
    client: Arc<dyn EngineClient>,
) -> TaskHandlerContext<J, S> {
    TaskHandlerContext::new(job, stage, task.id, client, CancellationToken::new())
}
