//! Subsystems managed by the coordinator.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use courier_work::Worker;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;

/// A component started at bootstrap and stopped at teardown.
#[async_trait]
pub trait Subsystem: Send + Sync {
    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// Start the subsystem.
    async fn start(&self) -> anyhow::Result<()>;

    /// Stop the subsystem. Returns the number of units of work interrupted.
    async fn stop(&self) -> anyhow::Result<u64>;

    /// Time `stop` may take before in-flight work has a recorded outcome.
    ///
    /// The coordinator refuses subsystems whose budget does not fit in its
    /// teardown timeout.
    fn stop_budget(&self) -> Duration {
        Duration::ZERO
    }
}

#[async_trait]
impl Subsystem for Worker {
    fn name(&self) -> &str {
        self.stage_type()
    }

    async fn start(&self) -> anyhow::Result<()> {
        Worker::start(self).await?;
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<u64> {
        let stats = Worker::stop(self).await;
        Ok(stats.interrupted())
    }

    fn stop_budget(&self) -> Duration {
        self.options().shutdown_grace_period
    }
}

/// Owns the non-blocking log writer and flushes it at teardown.
pub struct LogPipeline {
    guard: Mutex<Option<WorkerGuard>>,
}

impl LogPipeline {
    /// Take ownership of the writer guard.
    pub fn new(guard: WorkerGuard) -> Self {
        Self {
            guard: Mutex::new(Some(guard)),
        }
    }

    /// Whether the pipeline has been flushed.
    pub fn is_flushed(&self) -> bool {
        self.guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[async_trait]
impl Subsystem for LogPipeline {
    fn name(&self) -> &str {
        "log-pipeline"
    }

    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<u64> {
        let guard = self
            .guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(guard) = guard {
            debug!("Flushing log pipeline");
            // Dropping the guard blocks until buffered lines are written.
            tokio::task::spawn_blocking(move || drop(guard)).await?;
        }
        Ok(0)
    }
}
