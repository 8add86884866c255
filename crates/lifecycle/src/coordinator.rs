//! Lifecycle coordinator.
//!
//! Starts subsystems in registration order and tears them down in parallel,
//! each bounded by a timeout, when the process is asked to stop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::{LifecycleError, Result};
use crate::state::LifecycleState;
use crate::subsystem::Subsystem;

/// Headroom a subsystem with a stop budget needs on top of it, for reporting
/// abandoned work back to the engine.
pub const TEARDOWN_MARGIN: Duration = Duration::from_secs(5);

/// How one subsystem ended at teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StopOutcome {
    /// Stopped cleanly, interrupting `interrupted` units of work
    Stopped {
        /// Work cancelled or abandoned by the stop
        interrupted: u64,
    },
    /// `stop` returned an error
    Failed(String),
    /// `stop` did not finish within the teardown timeout
    TimedOut,
}

/// Per-subsystem teardown result.
#[derive(Debug, Clone, Serialize)]
pub struct SubsystemReport {
    /// Subsystem name
    pub name: String,
    /// Outcome
    pub outcome: StopOutcome,
}

/// Result of a full teardown.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    /// One entry per registered subsystem, in registration order
    pub subsystems: Vec<SubsystemReport>,
}

impl ShutdownReport {
    /// Whether every subsystem stopped in time without error.
    pub fn is_clean(&self) -> bool {
        self.subsystems
            .iter()
            .all(|s| matches!(s.outcome, StopOutcome::Stopped { .. }))
    }

    /// Total interrupted work.
    pub fn interrupted(&self) -> u64 {
        self.subsystems
            .iter()
            .map(|s| match s.outcome {
                StopOutcome::Stopped { interrupted } => interrupted,
                _ => 0,
            })
            .sum()
    }

    /// Outcome of a subsystem by name.
    pub fn outcome(&self, name: &str) -> Option<&StopOutcome> {
        self.subsystems
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.outcome)
    }
}

/// Drives the process through `Created -> Started -> Stopping -> Stopped`.
pub struct LifecycleCoordinator {
    subsystems: Vec<Arc<dyn Subsystem>>,
    state: watch::Sender<LifecycleState>,
    teardown_timeout: Duration,
}

impl LifecycleCoordinator {
    /// Create a coordinator in the `Created` state.
    pub fn new(teardown_timeout: Duration) -> Self {
        let (state, _) = watch::channel(LifecycleState::Created);
        Self {
            subsystems: Vec::new(),
            state,
            teardown_timeout,
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Add a subsystem. Only allowed before `start`.
    ///
    /// Rejects a subsystem whose stop budget plus [`TEARDOWN_MARGIN`] exceeds
    /// the teardown timeout, since its stop would be cut off mid-way.
    pub fn register(&mut self, subsystem: Arc<dyn Subsystem>) -> Result<()> {
        let state = self.state();
        if state != LifecycleState::Created {
            return Err(LifecycleError::InvalidTransition {
                from: state,
                to: LifecycleState::Created,
            });
        }

        let budget = subsystem.stop_budget();
        if !budget.is_zero() && budget + TEARDOWN_MARGIN > self.teardown_timeout {
            return Err(LifecycleError::TeardownBudget {
                subsystem: subsystem.name().to_string(),
                budget: budget + TEARDOWN_MARGIN,
                timeout: self.teardown_timeout,
            });
        }
        info!("Registered subsystem: {}", subsystem.name());
        self.subsystems.push(subsystem);
        Ok(())
    }

    /// Start every subsystem in registration order.
    ///
    /// On failure the subsystems already started are stopped again and the
    /// coordinator stays `Created`.
    pub async fn start(&self) -> Result<()> {
        let state = self.state();
        if state != LifecycleState::Created {
            return Err(LifecycleError::InvalidTransition {
                from: state,
                to: LifecycleState::Started,
            });
        }

        for (index, subsystem) in self.subsystems.iter().enumerate() {
            if let Err(source) = subsystem.start().await {
                error!("Failed to start {}: {:#}", subsystem.name(), source);
                self.roll_back(&self.subsystems[..index]).await;
                return Err(LifecycleError::Bootstrap {
                    subsystem: subsystem.name().to_string(),
                    source,
                });
            }
            info!("Started {}", subsystem.name());
        }

        self.state.send_replace(LifecycleState::Started);
        info!("Lifecycle started with {} subsystem(s)", self.subsystems.len());
        Ok(())
    }

    async fn roll_back(&self, started: &[Arc<dyn Subsystem>]) {
        for subsystem in started.iter().rev() {
            if let Err(e) = subsystem.stop().await {
                warn!("Failed to stop {} during rollback: {:#}", subsystem.name(), e);
            }
        }
    }

    /// Stop every subsystem concurrently, each bounded by the teardown
    /// timeout, and wait for all of them to settle.
    pub async fn shutdown(&self) -> Result<ShutdownReport> {
        let state = self.state();
        if state != LifecycleState::Started {
            return Err(LifecycleError::InvalidTransition {
                from: state,
                to: LifecycleState::Stopping,
            });
        }
        self.state.send_replace(LifecycleState::Stopping);
        info!("Shutting down {} subsystem(s)", self.subsystems.len());

        let timeout = self.teardown_timeout;
        let stops = self.subsystems.iter().map(|subsystem| async move {
            let outcome = match tokio::time::timeout(timeout, subsystem.stop()).await {
                Ok(Ok(interrupted)) => StopOutcome::Stopped { interrupted },
                Ok(Err(e)) => StopOutcome::Failed(format!("{:#}", e)),
                Err(_) => StopOutcome::TimedOut,
            };
            SubsystemReport {
                name: subsystem.name().to_string(),
                outcome,
            }
        });
        let report = ShutdownReport {
            subsystems: futures::future::join_all(stops).await,
        };

        for entry in &report.subsystems {
            match &entry.outcome {
                StopOutcome::Stopped { interrupted } => {
                    info!("Stopped {} (interrupted: {})", entry.name, interrupted)
                }
                StopOutcome::Failed(e) => error!("Failed to stop {}: {}", entry.name, e),
                StopOutcome::TimedOut => {
                    error!("Timed out stopping {} after {:?}", entry.name, timeout)
                }
            }
        }

        self.state.send_replace(LifecycleState::Stopped);
        Ok(report)
    }

    /// Wait for `signal`, then shut down.
    pub async fn run_until<F>(&self, signal: F) -> Result<ShutdownReport>
    where
        F: Future<Output = ()>,
    {
        signal.await;
        self.shutdown().await
    }
}

impl Default for LifecycleCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(40))
    }
}
