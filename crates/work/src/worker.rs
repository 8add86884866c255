//! Worker registration and the poll/dispatch loop.
//!
//! A [`Worker`] claims tasks of one stage type, runs each on its own tokio
//! task (bounded by a semaphore) and reports the outcome back to the engine.
//! Handler failures never escape the loop: they become attempt outcomes plus
//! one [`WorkerError`] event on the error channel.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use courier_core::{JobKind, StageKind, TaskId, TaskRecord};
use courier_engine::EngineClient;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::dispatch::{Dispatch, DispatchError, TypedDispatch};
use crate::error::WorkerError;
use crate::handler::TaskHandler;

/// Reason reported to the engine for a handler dropped at shutdown.
pub const ABANDONED_REASON: &str = "abandoned at shutdown";

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Wait between polls when the queue is empty or the engine errored
    pub poll_interval: Duration,

    /// Maximum number of concurrent dispatches
    pub concurrency: usize,

    /// How long `stop` waits for in-flight handlers before abandoning them
    pub shutdown_grace_period: Duration,

    /// Capacity of the error event channel
    pub error_channel_capacity: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            concurrency: 4,
            shutdown_grace_period: Duration::from_secs(30),
            error_channel_capacity: 64,
        }
    }
}

impl WorkerOptions {
    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the concurrency limit.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the shutdown grace period.
    pub fn with_shutdown_grace_period(mut self, grace: Duration) -> Self {
        self.shutdown_grace_period = grace;
        self
    }

    /// Set the error channel capacity.
    pub fn with_error_channel_capacity(mut self, capacity: usize) -> Self {
        self.error_channel_capacity = capacity;
        self
    }
}

/// Dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// Tasks handed to the handler
    pub dispatched: u64,
    /// Attempts reported complete
    pub completed: u64,
    /// Attempts that failed (handler, decode, snapshot load or panic)
    pub failed: u64,
    /// Handlers that stopped on the termination signal
    pub cancelled: u64,
    /// Handlers dropped after the grace period
    pub abandoned: u64,
}

impl WorkerStats {
    /// Work interrupted by shutdown.
    pub fn interrupted(&self) -> u64 {
        self.cancelled + self.abandoned
    }

    /// Dispatches that reached an outcome.
    pub fn settled(&self) -> u64 {
        self.completed + self.failed + self.cancelled + self.abandoned
    }
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    abandoned: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

type ErrorListener = Arc<dyn Fn(&WorkerError) + Send + Sync>;

/// Sending half of the error channel.
#[derive(Clone)]
struct Reporter {
    tx: mpsc::Sender<WorkerError>,
}

impl Reporter {
    fn report(&self, err: WorkerError) {
        match self.tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                warn!("Error channel full, dropping event: {}", err);
            }
            Err(TrySendError::Closed(err)) => {
                error!("Error channel closed: {}", err);
            }
        }
    }
}

/// How a dispatch ended.
enum Outcome {
    Completed,
    Failed(DispatchError),
    Panicked,
    Abandoned,
}

struct Shared {
    client: Arc<dyn EngineClient>,
    dispatcher: Arc<dyn Dispatch>,
    options: WorkerOptions,
    counters: Counters,
    listeners: RwLock<Vec<ErrorListener>>,
}

struct Running {
    shutdown: CancellationToken,
    poll_loop: JoinHandle<()>,
    supervisor: JoinHandle<()>,
}

enum RunState {
    Created,
    Running(Running),
    Stopped(WorkerStats),
}

/// A registered worker for one stage type.
///
/// Cheap to clone; clones share the same loop and counters.
#[derive(Clone)]
pub struct Worker {
    shared: Arc<Shared>,
    state: Arc<Mutex<RunState>>,
}

/// Register `handler` for tasks of stage kind `S` in jobs of kind `J`.
///
/// The worker does nothing until [`Worker::start`] is called.
pub fn create_worker<J, S, H>(
    client: Arc<dyn EngineClient>,
    handler: H,
    options: WorkerOptions,
) -> Worker
where
    J: JobKind,
    S: StageKind,
    H: TaskHandler<J, S>,
{
    info!("Registering worker for {}/{}", J::NAME, S::NAME);
    Worker {
        shared: Arc::new(Shared {
            client,
            dispatcher: Arc::new(TypedDispatch::<J, S, H>::new(handler)),
            options,
            counters: Counters::default(),
            listeners: RwLock::new(Vec::new()),
        }),
        state: Arc::new(Mutex::new(RunState::Created)),
    }
}

impl Worker {
    /// Stage type this worker claims.
    pub fn stage_type(&self) -> &'static str {
        self.shared.dispatcher.stage_type()
    }

    /// Tuning this worker was created with.
    pub fn options(&self) -> &WorkerOptions {
        &self.shared.options
    }

    /// Register a listener, called once per error event.
    ///
    /// Listeners run on a supervising task, never on the dispatch path.
    pub fn on_error<F>(&self, listener: F)
    where
        F: Fn(&WorkerError) + Send + Sync + 'static,
    {
        self.shared
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Start claiming and dispatching tasks.
    ///
    /// Fails if the engine is unreachable or the worker was already stopped.
    /// Calling it on a running worker is a no-op.
    pub async fn start(&self) -> Result<(), WorkerError> {
        let mut state = self.state.lock().await;
        match &*state {
            RunState::Running(_) => return Ok(()),
            RunState::Stopped(_) => return Err(WorkerError::Stopped),
            RunState::Created => {}
        }

        self.shared.client.ping().await?;

        let (tx, rx) = mpsc::channel(self.shared.options.error_channel_capacity.max(1));
        let shutdown = CancellationToken::new();

        let supervisor = tokio::spawn(supervise(self.shared.clone(), rx));
        let poll_loop = tokio::spawn(poll_loop(
            self.shared.clone(),
            shutdown.clone(),
            Reporter { tx },
        ));

        *state = RunState::Running(Running {
            shutdown,
            poll_loop,
            supervisor,
        });

        info!(
            "Worker started: stage={}, concurrency={}",
            self.stage_type(),
            self.shared.options.concurrency
        );
        Ok(())
    }

    /// Stop claiming, signal in-flight handlers and wait for them to settle.
    ///
    /// Handlers still running after the grace period are abandoned and their
    /// tasks reported failed. Resolves once every dispatch has been reported
    /// and every error event delivered. Idempotent.
    pub async fn stop(&self) -> WorkerStats {
        let mut state = self.state.lock().await;
        let running = match std::mem::replace(&mut *state, RunState::Stopped(self.stats())) {
            RunState::Running(running) => running,
            RunState::Stopped(stats) => {
                *state = RunState::Stopped(stats);
                return stats;
            }
            RunState::Created => return self.stats(),
        };

        info!("Stopping worker: stage={}", self.stage_type());
        running.shutdown.cancel();

        if let Err(e) = running.poll_loop.await {
            error!("Poll loop terminated abnormally: {}", e);
        }
        if let Err(e) = running.supervisor.await {
            error!("Error supervisor terminated abnormally: {}", e);
        }

        let stats = self.stats();
        *state = RunState::Stopped(stats);
        info!(
            "Worker stopped: stage={}, completed={}, failed={}, interrupted={}",
            self.stage_type(),
            stats.completed,
            stats.failed,
            stats.interrupted()
        );
        stats
    }

    /// Current counters.
    pub fn stats(&self) -> WorkerStats {
        self.shared.counters.snapshot()
    }

    /// Whether the poll loop is running.
    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, RunState::Running(_))
    }
}

/// Deliver error events to the registered listeners.
async fn supervise(shared: Arc<Shared>, mut rx: mpsc::Receiver<WorkerError>) {
    while let Some(err) = rx.recv().await {
        let listeners: Vec<ErrorListener> = shared
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if listeners.is_empty() {
            error!("Worker error: {}", err);
            continue;
        }

        for listener in listeners {
            if std::panic::catch_unwind(AssertUnwindSafe(|| listener(&err))).is_err() {
                error!("Error listener panicked while handling: {}", err);
            }
        }
    }
}

async fn poll_loop(shared: Arc<Shared>, shutdown: CancellationToken, reporter: Reporter) {
    let stage_type = shared.dispatcher.stage_type();
    let semaphore = Arc::new(Semaphore::new(shared.options.concurrency.max(1)));
    let tracker = TaskTracker::new();
    let abandon = CancellationToken::new();

    debug!("Polling for '{}' tasks", stage_type);

    loop {
        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        // A claim is never abandoned half-way; stop is checked once it returns.
        match shared.client.dequeue(stage_type).await {
            Ok(Some(task)) if shutdown.is_cancelled() => {
                debug!("Releasing task {} claimed during shutdown", task.id);
                if let Err(e) = shared.client.release(task.id).await {
                    reporter.report(WorkerError::Engine(e));
                }
                break;
            }
            Ok(Some(task)) => {
                Counters::bump(&shared.counters.dispatched);
                tracker.spawn(dispatch(
                    shared.clone(),
                    task,
                    shutdown.child_token(),
                    abandon.clone(),
                    reporter.clone(),
                    permit,
                ));
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to claim '{}' task: {}", stage_type, e);
                reporter.report(WorkerError::Engine(e));
            }
        }

        drop(permit);
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(shared.options.poll_interval) => {}
        }
    }

    tracker.close();
    let grace = shared.options.shutdown_grace_period;
    if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
        warn!(
            "Grace period of {:?} expired, abandoning {} handler(s)",
            grace,
            tracker.len()
        );
        abandon.cancel();
        tracker.wait().await;
    }

    debug!("Poll loop for '{}' finished", stage_type);
}

async fn dispatch(
    shared: Arc<Shared>,
    task: TaskRecord,
    signal: CancellationToken,
    abandon: CancellationToken,
    reporter: Reporter,
    _permit: OwnedSemaphorePermit,
) {
    let task_id = task.id;
    let span = info_span!(
        "task",
        job.id = tracing::field::Empty,
        stage.id = %task.stage_id,
        task.id = %task_id,
        attempt = task.attempts,
    );

    let run = shared
        .dispatcher
        .dispatch(task, shared.client.clone(), signal, span.clone())
        .instrument(span.clone());

    let outcome = tokio::select! {
        result = AssertUnwindSafe(run).catch_unwind() => match result {
            Ok(Ok(())) => Outcome::Completed,
            Ok(Err(e)) => Outcome::Failed(e),
            Err(_) => Outcome::Panicked,
        },
        _ = abandon.cancelled() => Outcome::Abandoned,
    };

    settle(&shared, task_id, outcome, &reporter)
        .instrument(span)
        .await;
}

/// Report a dispatch outcome to the engine and the error channel.
async fn settle(shared: &Shared, task_id: TaskId, outcome: Outcome, reporter: &Reporter) {
    let counters = &shared.counters;

    let event = match outcome {
        Outcome::Completed => {
            match shared.client.complete(task_id).await {
                Ok(()) => {
                    Counters::bump(&counters.completed);
                    info!("Task completed");
                }
                Err(e) => {
                    // The engine still holds the claim; its lease decides the task's fate.
                    Counters::bump(&counters.failed);
                    warn!("Failed to report completion: {}", e);
                    reporter.report(WorkerError::Engine(e));
                }
            }
            return;
        }
        Outcome::Failed(DispatchError::Handler(source)) => {
            if source.is_cancelled() {
                Counters::bump(&counters.cancelled);
            } else {
                Counters::bump(&counters.failed);
            }
            WorkerError::Handler { task_id, source }
        }
        Outcome::Failed(DispatchError::Decode(source)) => {
            Counters::bump(&counters.failed);
            WorkerError::Decode { task_id, source }
        }
        Outcome::Failed(DispatchError::Engine(source)) => {
            Counters::bump(&counters.failed);
            WorkerError::Engine(source)
        }
        Outcome::Panicked => {
            Counters::bump(&counters.failed);
            WorkerError::Panicked { task_id }
        }
        Outcome::Abandoned => {
            Counters::bump(&counters.abandoned);
            WorkerError::Abandoned { task_id }
        }
    };

    let reason = match &event {
        WorkerError::Handler { source, .. } => source.to_string(),
        WorkerError::Decode { source, .. } => source.to_string(),
        WorkerError::Abandoned { .. } => ABANDONED_REASON.to_string(),
        other => other.to_string(),
    };
    warn!("Task failed: {}", reason);

    match shared.client.fail(task_id, &reason).await {
        Ok(status) => debug!("Engine moved task to {}", status),
        Err(e) => reporter.report(WorkerError::Engine(e)),
    }
    reporter.report(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TaskHandlerContext;
    use crate::error::HandlerError;
    use async_trait::async_trait;
    use courier_core::{TaskOf, TaskStatus};
    use courier_engine::{JobSpec, MemoryEngine, Producer, StageSpec, TaskSpec};
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicBool;

    struct Parcel;

    impl JobKind for Parcel {
        const NAME: &'static str = "parcel";
        type Data = Value;
        type UserMetadata = Value;
    }

    struct Sort;

    impl StageKind for Sort {
        const NAME: &'static str = "sort";
        type Data = Value;
        type UserMetadata = Value;
        type TaskData = Value;
        type TaskUserMetadata = Value;
    }

    /// Fails tasks marked `"fail": true`, panics on `"panic": true`.
    struct ScriptedHandler;

    #[async_trait]
    impl TaskHandler<Parcel, Sort> for ScriptedHandler {
        async fn handle(
            &self,
            task: &TaskOf<Sort>,
            _ctx: &TaskHandlerContext<Parcel, Sort>,
        ) -> Result<(), HandlerError> {
            if task.data["panic"] == json!(true) {
                panic!("scripted panic");
            }
            if task.data["fail"] == json!(true) {
                return Err(HandlerError::validation("scripted failure"));
            }
            Ok(())
        }
    }

    /// Waits on the termination signal for up to an hour.
    struct PatientHandler;

    #[async_trait]
    impl TaskHandler<Parcel, Sort> for PatientHandler {
        async fn handle(
            &self,
            _task: &TaskOf<Sort>,
            ctx: &TaskHandlerContext<Parcel, Sort>,
        ) -> Result<(), HandlerError> {
            ctx.sleep(Duration::from_secs(3600)).await
        }
    }

    /// Ignores the termination signal entirely.
    struct StubbornHandler;

    #[async_trait]
    impl TaskHandler<Parcel, Sort> for StubbornHandler {
        async fn handle(
            &self,
            _task: &TaskOf<Sort>,
            _ctx: &TaskHandlerContext<Parcel, Sort>,
        ) -> Result<(), HandlerError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    /// Finishes a short piece of work without looking at the signal.
    struct SlowHandler {
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl TaskHandler<Parcel, Sort> for SlowHandler {
        async fn handle(
            &self,
            _task: &TaskOf<Sort>,
            _ctx: &TaskHandlerContext<Parcel, Sort>,
        ) -> Result<(), HandlerError> {
            tokio::time::sleep(Duration::from_millis(150)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Takes the engine down before returning.
    struct OutageHandler {
        engine: MemoryEngine,
    }

    #[async_trait]
    impl TaskHandler<Parcel, Sort> for OutageHandler {
        async fn handle(
            &self,
            _task: &TaskOf<Sort>,
            _ctx: &TaskHandlerContext<Parcel, Sort>,
        ) -> Result<(), HandlerError> {
            self.engine.set_reachable(false);
            Ok(())
        }
    }

    fn options() -> WorkerOptions {
        WorkerOptions::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_shutdown_grace_period(Duration::from_secs(5))
    }

    async fn seed(engine: &MemoryEngine, tasks: Vec<Value>, max_attempts: u32) -> Vec<TaskId> {
        let job = engine
            .create_job(JobSpec {
                name: Parcel::NAME.to_string(),
                priority: Default::default(),
                data: json!({}),
                user_metadata: json!({}),
            })
            .await
            .unwrap();
        let stage = engine
            .create_stage(
                job.id,
                StageSpec {
                    stage_type: Sort::NAME.to_string(),
                    data: json!({}),
                    user_metadata: json!({}),
                },
            )
            .await
            .unwrap();
        let specs = tasks
            .into_iter()
            .map(|data| TaskSpec {
                data,
                user_metadata: json!({}),
                max_attempts,
            })
            .collect();
        engine
            .create_tasks(stage.id, Sort::NAME, specs)
            .await
            .unwrap()
            .into_iter()
            .map(|task| task.id)
            .collect()
    }

    async fn wait_for(worker: &Worker, done: impl Fn(&WorkerStats) -> bool) {
        for _ in 0..500 {
            if done(&worker.stats()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached: {:?}", worker.stats());
    }

    fn collect_errors(worker: &Worker) -> Arc<std::sync::Mutex<Vec<String>>> {
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = events.clone();
        worker.on_error(move |err| sink.lock().unwrap().push(err.to_string()));
        events
    }

    #[tokio::test]
    async fn test_failure_emits_one_event_and_dispatch_continues() {
        let engine = MemoryEngine::new();
        let ids = seed(
            &engine,
            vec![json!({ "fail": true }), json!({}), json!({})],
            1,
        )
        .await;

        let worker = create_worker(Arc::new(engine.clone()), ScriptedHandler, options());
        let events = collect_errors(&worker);
        worker.start().await.unwrap();

        wait_for(&worker, |s| s.settled() == 3).await;
        let stats = worker.stop().await;

        assert_eq!(stats.dispatched, 3);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].contains("scripted failure"));

        assert_eq!(engine.task(ids[0]).await.unwrap().status, TaskStatus::Failed);
        assert_eq!(engine.task(ids[1]).await.unwrap().status, TaskStatus::Completed);
        assert_eq!(engine.failure_reasons(ids[0]).await, vec!["scripted failure"]);
    }

    #[tokio::test]
    async fn test_failed_attempt_is_retried_by_engine() {
        let engine = MemoryEngine::new();
        let ids = seed(&engine, vec![json!({ "fail": true })], 3).await;

        let worker = create_worker(Arc::new(engine.clone()), ScriptedHandler, options());
        let events = collect_errors(&worker);
        worker.start().await.unwrap();

        wait_for(&worker, |s| s.failed == 3).await;
        worker.stop().await;

        let task = engine.task(ids[0]).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempts, 3);
        assert_eq!(events.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let engine = MemoryEngine::new();
        let ids = seed(&engine, vec![json!({ "panic": true }), json!({})], 1).await;

        let worker = create_worker(Arc::new(engine.clone()), ScriptedHandler, options());
        let events = collect_errors(&worker);
        worker.start().await.unwrap();

        wait_for(&worker, |s| s.settled() == 2).await;
        let stats = worker.stop().await;

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(engine.task(ids[0]).await.unwrap().status, TaskStatus::Failed);
        assert!(events.lock().unwrap()[0].contains("panicked"));
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_and_stops_claiming() {
        let engine = MemoryEngine::new();
        seed(&engine, vec![json!({})], 1).await;

        let finished = Arc::new(AtomicBool::new(false));
        let handler = SlowHandler {
            finished: finished.clone(),
        };
        let worker = create_worker(Arc::new(engine.clone()), handler, options());
        worker.start().await.unwrap();

        wait_for(&worker, |s| s.dispatched == 1).await;
        let stats = worker.stop().await;

        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(stats.completed, 1);

        seed(&engine, vec![json!({})], 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(worker.stats().dispatched, 1);
        assert_eq!(engine.queued(Sort::NAME).await, 1);
    }

    #[tokio::test]
    async fn test_stop_cancels_waiting_handler() {
        let engine = MemoryEngine::new();
        let ids = seed(&engine, vec![json!({})], 3).await;

        let worker = create_worker(Arc::new(engine.clone()), PatientHandler, options());
        let events = collect_errors(&worker);
        worker.start().await.unwrap();

        wait_for(&worker, |s| s.dispatched == 1).await;
        let stats = worker.stop().await;

        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.interrupted(), 1);
        assert!(events.lock().unwrap()[0].contains("cancelled"));
        assert_eq!(engine.task(ids[0]).await.unwrap().status, TaskStatus::Retried);
    }

    #[tokio::test]
    async fn test_stop_abandons_handler_after_grace_period() {
        let engine = MemoryEngine::new();
        let ids = seed(&engine, vec![json!({})], 1).await;

        let options = options().with_shutdown_grace_period(Duration::from_millis(50));
        let worker = create_worker(Arc::new(engine.clone()), StubbornHandler, options);
        worker.start().await.unwrap();

        wait_for(&worker, |s| s.dispatched == 1).await;
        let stats = worker.stop().await;

        assert_eq!(stats.abandoned, 1);
        assert_eq!(engine.task(ids[0]).await.unwrap().status, TaskStatus::Failed);
        assert_eq!(engine.failure_reasons(ids[0]).await, vec![ABANDONED_REASON]);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_is_final() {
        let engine = MemoryEngine::new();
        let worker = create_worker(Arc::new(engine), ScriptedHandler, options());

        worker.start().await.unwrap();
        worker.start().await.unwrap();
        assert!(worker.is_running().await);

        let first = worker.stop().await;
        let second = worker.stop().await;
        assert_eq!(first, second);
        assert!(!worker.is_running().await);
        assert!(matches!(worker.start().await, Err(WorkerError::Stopped)));
    }

    #[tokio::test]
    async fn test_start_fails_when_engine_unreachable() {
        let engine = MemoryEngine::new();
        engine.set_reachable(false);

        let worker = create_worker(Arc::new(engine), ScriptedHandler, options());
        assert!(matches!(worker.start().await, Err(WorkerError::Engine(_))));
        assert!(!worker.is_running().await);
    }

    #[tokio::test]
    async fn test_engine_outage_is_reported_and_survived() {
        let engine = MemoryEngine::new();
        let worker = create_worker(Arc::new(engine.clone()), ScriptedHandler, options());
        let events = collect_errors(&worker);
        worker.start().await.unwrap();

        engine.set_reachable(false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.set_reachable(true);

        seed(&engine, vec![json!({})], 1).await;
        wait_for(&worker, |s| s.completed == 1).await;
        worker.stop().await;

        assert!(events
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.contains("engine unavailable")));
    }

    #[tokio::test]
    async fn test_completion_counted_only_after_engine_confirms() {
        let engine = MemoryEngine::new();
        let ids = seed(&engine, vec![json!({})], 1).await;

        let handler = OutageHandler {
            engine: engine.clone(),
        };
        let worker = create_worker(Arc::new(engine.clone()), handler, options());
        let events = collect_errors(&worker);
        worker.start().await.unwrap();

        wait_for(&worker, |s| s.settled() == 1).await;
        let stats = worker.stop().await;

        assert_eq!(stats.completed, 0);
        assert_eq!(stats.failed, 1);
        assert!(events
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.contains("engine unavailable")));

        engine.set_reachable(true);
        assert_eq!(engine.task(ids[0]).await.unwrap().status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn test_decode_failure_fails_task() {
        let engine = MemoryEngine::new();
        let job = engine
            .create_job(JobSpec {
                name: "otherJob".to_string(),
                priority: Default::default(),
                data: json!({}),
                user_metadata: json!({}),
            })
            .await
            .unwrap();
        let stage = engine
            .create_stage(
                job.id,
                StageSpec {
                    stage_type: Sort::NAME.to_string(),
                    data: json!({}),
                    user_metadata: json!({}),
                },
            )
            .await
            .unwrap();
        engine
            .create_tasks(stage.id, Sort::NAME, vec![TaskSpec::new(json!({})).with_max_attempts(1)])
            .await
            .unwrap();

        let worker = create_worker(Arc::new(engine.clone()), ScriptedHandler, options());
        let events = collect_errors(&worker);
        worker.start().await.unwrap();

        wait_for(&worker, |s| s.failed == 1).await;
        worker.stop().await;

        assert!(events.lock().unwrap()[0].contains("could not be decoded"));
    }
}
