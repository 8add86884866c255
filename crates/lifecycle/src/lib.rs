//! Process lifecycle for the Courier worker.
//!
//! The [`LifecycleCoordinator`] starts subsystems at bootstrap and, on a
//! termination signal, stops them concurrently with a bounded timeout.

#![warn(missing_docs)]

pub mod coordinator;
pub mod error;
pub mod liveness;
pub mod signal;
pub mod state;
pub mod subsystem;

pub use coordinator::{
    LifecycleCoordinator, ShutdownReport, StopOutcome, SubsystemReport, TEARDOWN_MARGIN,
};
pub use error::{LifecycleError, Result};
pub use liveness::{liveness_router, LivenessServer};
pub use signal::shutdown_signal;
pub use state::LifecycleState;
pub use subsystem::{LogPipeline, Subsystem};
