//! In-memory engine implementation.
//!
//! Keeps every record behind a single lock, which also gives per-entity
//! serialization of metadata updates. Used by tests, the demo seeder and
//! local runs without a remote engine.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{
    merge_metadata, Job, JobId, JobRecord, JobStatus, Stage, StageId, StageRecord, StageStatus,
    StageSummary, Task, TaskId, TaskRecord, TaskStatus,
};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::spec::{JobSpec, StageSpec, TaskSpec};
use crate::{EngineClient, EngineError, Producer, Result};

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, JobRecord>,
    stages: HashMap<StageId, StageRecord>,
    tasks: HashMap<TaskId, TaskRecord>,
    /// Claimable task ids per stage type, oldest first
    queues: HashMap<String, VecDeque<TaskId>>,
    /// Failure reasons reported per task, in order
    failures: HashMap<TaskId, Vec<String>>,
}

/// In-memory job engine.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<State>>,
    unreachable: Arc<AtomicBool>,
    reject_metadata: Arc<AtomicBool>,
}

impl MemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate connectivity loss (`false`) or recovery (`true`).
    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Make every metadata update fail with [`EngineError::Rejected`].
    pub fn reject_metadata_updates(&self, reject: bool) {
        self.reject_metadata.store(reject, Ordering::SeqCst);
    }

    /// Current state of a task.
    pub async fn task(&self, id: TaskId) -> Option<TaskRecord> {
        self.state.lock().await.tasks.get(&id).cloned()
    }

    /// Current state of a stage.
    pub async fn stage(&self, id: StageId) -> Option<StageRecord> {
        self.state.lock().await.stages.get(&id).cloned()
    }

    /// Current state of a job.
    pub async fn job(&self, id: JobId) -> Option<JobRecord> {
        self.state.lock().await.jobs.get(&id).cloned()
    }

    /// Failure reasons reported for a task.
    pub async fn failure_reasons(&self, id: TaskId) -> Vec<String> {
        self.state
            .lock()
            .await
            .failures
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of claimable tasks of a stage type.
    pub async fn queued(&self, stage_type: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(stage_type)
            .map_or(0, VecDeque::len)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn check_metadata_accepted(&self) -> Result<()> {
        if self.reject_metadata.load(Ordering::SeqCst) {
            return Err(EngineError::Rejected("metadata update refused".to_string()));
        }
        Ok(())
    }
}

impl State {
    fn stage_type_of(&self, task: &TaskRecord) -> Result<String> {
        self.stages
            .get(&task.stage_id)
            .map(|stage| stage.stage_type.clone())
            .ok_or_else(|| EngineError::NotFound(format!("stage {}", task.stage_id)))
    }

    /// Move a task to `to`, keeping its stage summary and statuses in step.
    fn set_task_status(&mut self, task_id: TaskId, to: TaskStatus) -> Result<()> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| EngineError::NotFound(format!("task {}", task_id)))?;
        let from = task.status;
        task.status = to;
        let stage_id = task.stage_id;

        let stage = self
            .stages
            .get_mut(&stage_id)
            .ok_or_else(|| EngineError::NotFound(format!("stage {}", stage_id)))?;
        stage.summary.transition(from, to);

        stage.status = match to {
            TaskStatus::Failed => StageStatus::Failed,
            _ if stage.summary.is_done() => StageStatus::Completed,
            TaskStatus::InProgress if stage.status == StageStatus::Pending => StageStatus::InProgress,
            _ => stage.status,
        };
        let job_id = stage.job_id;

        let job_done = self
            .stages
            .values()
            .filter(|stage| stage.job_id == job_id)
            .all(|stage| stage.status == StageStatus::Completed);

        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| EngineError::NotFound(format!("job {}", job_id)))?;
        job.status = match to {
            TaskStatus::Failed => JobStatus::Failed,
            _ if job_done => JobStatus::Completed,
            TaskStatus::InProgress if job.status == JobStatus::Pending => JobStatus::InProgress,
            _ => job.status,
        };

        Ok(())
    }

    fn claimed_task(&self, task_id: TaskId) -> Result<&TaskRecord> {
        let task = self
            .tasks
            .get(&task_id)
            .ok_or_else(|| EngineError::NotFound(format!("task {}", task_id)))?;
        if task.status != TaskStatus::InProgress {
            return Err(EngineError::InvalidState(format!(
                "task {} is {}, not IN_PROGRESS",
                task_id, task.status
            )));
        }
        Ok(task)
    }
}

#[async_trait]
impl EngineClient for MemoryEngine {
    async fn ping(&self) -> Result<()> {
        self.check_reachable()
    }

    async fn dequeue(&self, stage_type: &str) -> Result<Option<TaskRecord>> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;

        loop {
            let Some(task_id) = state.queues.get_mut(stage_type).and_then(VecDeque::pop_front) else {
                return Ok(None);
            };

            let claimable = state
                .tasks
                .get(&task_id)
                .is_some_and(|task| matches!(task.status, TaskStatus::Pending | TaskStatus::Retried));
            if !claimable {
                continue;
            }

            state.set_task_status(task_id, TaskStatus::InProgress)?;
            let task = state
                .tasks
                .get_mut(&task_id)
                .ok_or_else(|| EngineError::NotFound(format!("task {}", task_id)))?;
            task.attempts += 1;

            debug!(task.id = %task_id, attempt = task.attempts, "Task claimed");
            return Ok(Some(task.clone()));
        }
    }

    async fn release(&self, task_id: TaskId) -> Result<()> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;

        let stage_type = state.stage_type_of(state.claimed_task(task_id)?)?;
        state.set_task_status(task_id, TaskStatus::Pending)?;
        if let Some(task) = state.tasks.get_mut(&task_id) {
            task.attempts = task.attempts.saturating_sub(1);
        }
        state.queues.entry(stage_type).or_default().push_front(task_id);

        debug!(task.id = %task_id, "Task released");
        Ok(())
    }

    async fn complete(&self, task_id: TaskId) -> Result<()> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;

        state.claimed_task(task_id)?;
        state.set_task_status(task_id, TaskStatus::Completed)?;

        debug!(task.id = %task_id, "Task completed");
        Ok(())
    }

    async fn fail(&self, task_id: TaskId, reason: &str) -> Result<TaskStatus> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;

        let task = state.claimed_task(task_id)?;
        let retry = task.can_retry();
        let stage_type = state.stage_type_of(task)?;

        state
            .failures
            .entry(task_id)
            .or_default()
            .push(reason.to_string());

        if retry {
            state.set_task_status(task_id, TaskStatus::Retried)?;
            state.queues.entry(stage_type).or_default().push_back(task_id);
            debug!(task.id = %task_id, reason, "Task failed, will retry");
            Ok(TaskStatus::Retried)
        } else {
            state.set_task_status(task_id, TaskStatus::Failed)?;
            warn!(task.id = %task_id, reason, "Task failed terminally");
            Ok(TaskStatus::Failed)
        }
    }

    async fn get_job(&self, id: JobId) -> Result<JobRecord> {
        self.check_reachable()?;
        self.state
            .lock()
            .await
            .jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("job {}", id)))
    }

    async fn get_stage(&self, id: StageId) -> Result<StageRecord> {
        self.check_reachable()?;
        self.state
            .lock()
            .await
            .stages
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("stage {}", id)))
    }

    async fn update_job_user_metadata(&self, id: JobId, patch: Value) -> Result<()> {
        self.check_reachable()?;
        self.check_metadata_accepted()?;
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("job {}", id)))?;
        merge_metadata(&mut job.user_metadata, patch);
        Ok(())
    }

    async fn update_stage_user_metadata(&self, id: StageId, patch: Value) -> Result<()> {
        self.check_reachable()?;
        self.check_metadata_accepted()?;
        let mut state = self.state.lock().await;
        let stage = state
            .stages
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("stage {}", id)))?;
        merge_metadata(&mut stage.user_metadata, patch);
        Ok(())
    }

    async fn update_task_user_metadata(&self, id: TaskId, patch: Value) -> Result<()> {
        self.check_reachable()?;
        self.check_metadata_accepted()?;
        let mut state = self.state.lock().await;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("task {}", id)))?;
        merge_metadata(&mut task.user_metadata, patch);
        Ok(())
    }
}

#[async_trait]
impl Producer for MemoryEngine {
    async fn create_job(&self, spec: JobSpec) -> Result<JobRecord> {
        self.check_reachable()?;
        let job = Job {
            id: JobId::new(),
            name: spec.name,
            status: JobStatus::Pending,
            priority: spec.priority,
            creation_time: chrono::Utc::now(),
            data: spec.data,
            user_metadata: spec.user_metadata,
            traceparent: None,
        };

        self.state.lock().await.jobs.insert(job.id, job.clone());
        info!(job.id = %job.id, job.name = %job.name, "Job created");
        Ok(job)
    }

    async fn create_stage(&self, job_id: JobId, spec: StageSpec) -> Result<StageRecord> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        if !state.jobs.contains_key(&job_id) {
            return Err(EngineError::NotFound(format!("job {}", job_id)));
        }

        let order = state.stages.values().filter(|s| s.job_id == job_id).count() as u32 + 1;
        let stage = Stage {
            id: StageId::new(),
            job_id,
            stage_type: spec.stage_type,
            order,
            status: StageStatus::Pending,
            summary: StageSummary::default(),
            data: spec.data,
            user_metadata: spec.user_metadata,
            traceparent: None,
        };

        state.stages.insert(stage.id, stage.clone());
        info!(stage.id = %stage.id, stage.kind = %stage.stage_type, order, "Stage created");
        Ok(stage)
    }

    async fn create_tasks(
        &self,
        stage_id: StageId,
        stage_type: &str,
        specs: Vec<TaskSpec>,
    ) -> Result<Vec<TaskRecord>> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;

        let stage = state
            .stages
            .get_mut(&stage_id)
            .ok_or_else(|| EngineError::NotFound(format!("stage {}", stage_id)))?;
        if stage.stage_type != stage_type {
            return Err(EngineError::Rejected(format!(
                "stage {} is of type '{}', not '{}'",
                stage_id, stage.stage_type, stage_type
            )));
        }

        let now = chrono::Utc::now();
        let tasks: Vec<TaskRecord> = specs
            .into_iter()
            .map(|spec| Task {
                id: TaskId::new(),
                stage_id,
                status: TaskStatus::Pending,
                attempts: 0,
                max_attempts: spec.max_attempts,
                creation_time: now,
                data: spec.data,
                user_metadata: spec.user_metadata,
                traceparent: None,
            })
            .collect();

        for _ in &tasks {
            stage.summary.add(TaskStatus::Pending);
        }
        if stage.status == StageStatus::Completed && !tasks.is_empty() {
            stage.status = StageStatus::InProgress;
        }

        let queue = state.queues.entry(stage_type.to_string()).or_default();
        queue.extend(tasks.iter().map(|task| task.id));
        for task in &tasks {
            state.tasks.insert(task.id, task.clone());
        }

        info!(stage.id = %stage_id, count = tasks.len(), "Tasks created");
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded(max_attempts: u32) -> (MemoryEngine, StageId, TaskId) {
        let engine = MemoryEngine::new();
        let job = engine
            .create_job(JobSpec {
                name: "hazmatTransport".to_string(),
                priority: Default::default(),
                data: json!({ "unNumber": "UN1993" }),
                user_metadata: json!({ "casualtyCount": 0 }),
            })
            .await
            .unwrap();
        let stage = engine
            .create_stage(
                job.id,
                StageSpec {
                    stage_type: "delivery".to_string(),
                    data: json!({ "location": "Warehouse 42" }),
                    user_metadata: json!({}),
                },
            )
            .await
            .unwrap();
        let tasks = engine
            .create_tasks(
                stage.id,
                "delivery",
                vec![TaskSpec {
                    data: json!({ "itemId": "ITEM123", "quantity": 5 }),
                    user_metadata: json!({}),
                    max_attempts,
                }],
            )
            .await
            .unwrap();
        (engine, stage.id, tasks[0].id)
    }

    #[tokio::test]
    async fn test_claim_and_complete() {
        let (engine, stage_id, task_id) = seeded(3).await;

        let task = engine.dequeue("delivery").await.unwrap().unwrap();
        assert_eq!(task.id, task_id);
        assert_eq!(task.attempts, 1);
        assert!(engine.dequeue("delivery").await.unwrap().is_none());

        engine.complete(task_id).await.unwrap();

        let stage = engine.stage(stage_id).await.unwrap();
        assert_eq!(stage.status, StageStatus::Completed);
        assert!(stage.summary.is_consistent());
        let job = engine.job(stage.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_retry_until_max_attempts() {
        let (engine, stage_id, task_id) = seeded(2).await;

        engine.dequeue("delivery").await.unwrap().unwrap();
        let status = engine.fail(task_id, "boom").await.unwrap();
        assert_eq!(status, TaskStatus::Retried);
        assert_eq!(engine.stage(stage_id).await.unwrap().summary.retried, 1);

        let task = engine.dequeue("delivery").await.unwrap().unwrap();
        assert_eq!(task.attempts, 2);
        let status = engine.fail(task_id, "boom again").await.unwrap();
        assert_eq!(status, TaskStatus::Failed);

        assert!(engine.dequeue("delivery").await.unwrap().is_none());
        assert_eq!(engine.failure_reasons(task_id).await, vec!["boom", "boom again"]);

        let stage = engine.stage(stage_id).await.unwrap();
        assert_eq!(stage.status, StageStatus::Failed);
        assert!(stage.summary.is_consistent());
        assert_eq!(engine.job(stage.job_id).await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_release_undoes_claim() {
        let (engine, _, task_id) = seeded(3).await;

        engine.dequeue("delivery").await.unwrap().unwrap();
        engine.release(task_id).await.unwrap();

        let task = engine.task(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert_eq!(engine.queued("delivery").await, 1);
    }

    #[tokio::test]
    async fn test_complete_requires_claim() {
        let (engine, _, task_id) = seeded(3).await;
        let err = engine.complete(task_id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_metadata_merge_and_rejection() {
        let (engine, stage_id, _) = seeded(3).await;

        engine
            .update_stage_user_metadata(stage_id, json!({ "signaturedBy": "John Doe" }))
            .await
            .unwrap();
        let stage = engine.stage(stage_id).await.unwrap();
        assert_eq!(stage.user_metadata, json!({ "signaturedBy": "John Doe" }));

        engine.reject_metadata_updates(true);
        let err = engine
            .update_stage_user_metadata(stage_id, json!({ "signaturedBy": "Jane" }))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Rejected(_)));

        let err = engine
            .update_task_user_metadata(TaskId::new(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_unreachable_engine() {
        let (engine, _, _) = seeded(3).await;
        engine.set_reachable(false);
        assert!(matches!(engine.ping().await, Err(EngineError::Unavailable(_))));
        assert!(engine.dequeue("delivery").await.is_err());

        engine.set_reachable(true);
        assert!(engine.dequeue("delivery").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_tasks_checks_stage_type() {
        let (engine, stage_id, _) = seeded(3).await;
        let err = engine
            .create_tasks(stage_id, "pickup", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Rejected(_)));
    }
}
