//! Handler and worker errors.

use courier_core::{ModelError, TaskId};
use courier_engine::EngineError;

/// Error returned by a task handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Business validation failed; the unit of work was not performed
    #[error("{0}")]
    Validation(String),

    /// A metadata update was refused or could not reach the engine
    #[error("metadata update failed: {0}")]
    Metadata(#[source] EngineError),

    /// The termination signal fired before the handler finished
    #[error("cancelled by termination signal")]
    Cancelled,

    /// Any other handler failure
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Coarse classification of a [`HandlerError`] for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerErrorKind {
    /// Business validation failure
    Validation,
    /// Failure while propagating state to the engine
    Propagation,
    /// Interrupted by shutdown
    Cancelled,
    /// Anything else
    Other,
}

impl HandlerError {
    /// Build a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> HandlerErrorKind {
        match self {
            Self::Validation(_) => HandlerErrorKind::Validation,
            Self::Metadata(_) => HandlerErrorKind::Propagation,
            Self::Cancelled => HandlerErrorKind::Cancelled,
            Self::Failed(_) => HandlerErrorKind::Other,
        }
    }

    /// Whether the handler was interrupted rather than failing on its own.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Error event emitted by a worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Talking to the engine failed
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The handler returned an error
    #[error("task {task_id} failed: {source}")]
    Handler {
        /// Failed task
        task_id: TaskId,
        /// Handler error
        #[source]
        source: HandlerError,
    },

    /// The task, its stage or its job did not match the registered kinds
    #[error("task {task_id} could not be decoded: {source}")]
    Decode {
        /// Undecodable task
        task_id: TaskId,
        /// Decode error
        #[source]
        source: ModelError,
    },

    /// The handler panicked
    #[error("handler panicked on task {task_id}")]
    Panicked {
        /// Task being handled
        task_id: TaskId,
    },

    /// The handler outlived the shutdown grace period
    #[error("task {task_id} abandoned at shutdown")]
    Abandoned {
        /// Task being handled
        task_id: TaskId,
    },

    /// The worker has already been stopped
    #[error("worker is stopped")]
    Stopped,
}

impl WorkerError {
    /// Task the error relates to, if any.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::Handler { task_id, .. }
            | Self::Decode { task_id, .. }
            | Self::Panicked { task_id }
            | Self::Abandoned { task_id } => Some(*task_id),
            Self::Engine(_) | Self::Stopped => None,
        }
    }
}
