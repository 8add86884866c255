//! Per-invocation handler context.

use std::sync::Arc;
use std::time::Duration;

use courier_core::{encode_payload, JobKind, JobOf, StageKind, StageOf, TaskId};
use courier_engine::{EngineClient, EngineError};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Span};

use crate::error::HandlerError;

/// Everything a handler may touch while processing one task.
///
/// Snapshots are taken when the task is dispatched and are not refreshed by
/// metadata updates made during the invocation.
pub struct TaskHandlerContext<J: JobKind, S: StageKind> {
    job: JobOf<J>,
    stage: StageOf<S>,
    task_id: TaskId,
    client: Arc<dyn EngineClient>,
    span: Span,
    signal: CancellationToken,
}

impl<J: JobKind, S: StageKind> TaskHandlerContext<J, S> {
    /// Create a context for one invocation.
    pub fn new(
        job: JobOf<J>,
        stage: StageOf<S>,
        task_id: TaskId,
        client: Arc<dyn EngineClient>,
        signal: CancellationToken,
    ) -> Self {
        let span = tracing::info_span!(
            "handler",
            job.id = %job.id,
            stage.id = %stage.id,
            task.id = %task_id,
        );
        Self {
            job,
            stage,
            task_id,
            client,
            span,
            signal,
        }
    }

    /// Use an existing span instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Job snapshot.
    pub fn job(&self) -> &JobOf<J> {
        &self.job
    }

    /// Stage snapshot.
    pub fn stage(&self) -> &StageOf<S> {
        &self.stage
    }

    /// Task being handled.
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Span scoped to this job, stage and task.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Termination signal.
    pub fn signal(&self) -> &CancellationToken {
        &self.signal
    }

    /// Whether the termination signal has fired.
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Wait for `duration`, or fail with [`HandlerError::Cancelled`] as soon
    /// as the termination signal fires.
    pub async fn sleep(&self, duration: Duration) -> Result<(), HandlerError> {
        tokio::select! {
            biased;
            _ = self.signal.cancelled() => Err(HandlerError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    // === Metadata updates ===

    /// Merge a partial update into the job's metadata.
    pub async fn update_job_user_metadata(
        &self,
        patch: &J::UserMetadata,
    ) -> Result<(), HandlerError> {
        let patch = encode_patch(patch)?;
        debug!(parent: &self.span, patch = %patch, "Updating job metadata");
        self.client
            .update_job_user_metadata(self.job.id, patch)
            .await
            .map_err(HandlerError::Metadata)
    }

    /// Merge a partial update into the stage's metadata.
    pub async fn update_stage_user_metadata(
        &self,
        patch: &S::UserMetadata,
    ) -> Result<(), HandlerError> {
        let patch = encode_patch(patch)?;
        debug!(parent: &self.span, patch = %patch, "Updating stage metadata");
        self.client
            .update_stage_user_metadata(self.stage.id, patch)
            .await
            .map_err(HandlerError::Metadata)
    }

    /// Merge a partial update into the task's metadata.
    pub async fn update_task_user_metadata(
        &self,
        patch: &S::TaskUserMetadata,
    ) -> Result<(), HandlerError> {
        let patch = encode_patch(patch)?;
        debug!(parent: &self.span, patch = %patch, "Updating task metadata");
        self.client
            .update_task_user_metadata(self.task_id, patch)
            .await
            .map_err(HandlerError::Metadata)
    }
}

/// A patch that cannot be encoded never reaches the engine, but still counts
/// as a failed update.
fn encode_patch<T: Serialize>(patch: &T) -> Result<Value, HandlerError> {
    encode_payload(patch, "userMetadata").map_err(|e| HandlerError::Metadata(EngineError::Model(e)))
}
