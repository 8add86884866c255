//! Lifecycle errors.

use std::time::Duration;

use crate::state::LifecycleState;

/// Result alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Errors raised by the lifecycle coordinator.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// A subsystem failed to start
    #[error("failed to start {subsystem}: {source}")]
    Bootstrap {
        /// Subsystem name
        subsystem: String,
        /// Underlying error
        #[source]
        source: anyhow::Error,
    },

    /// The requested transition is not allowed from the current state
    #[error("cannot move from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: LifecycleState,
        /// Requested state
        to: LifecycleState,
    },

    /// The teardown timeout is too short for a subsystem to settle its work
    #[error("{subsystem} needs {budget:?} to stop, more than the {timeout:?} teardown timeout allows")]
    TeardownBudget {
        /// Subsystem name
        subsystem: String,
        /// Time the subsystem's stop needs, margin included
        budget: Duration,
        /// Configured teardown timeout
        timeout: Duration,
    },

    /// The liveness endpoint could not be bound
    #[error("liveness endpoint: {0}")]
    Io(#[from] std::io::Error),
}
