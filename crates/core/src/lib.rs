//! Courier core data models.
//!
//! Jobs, stages and tasks as the job engine stores them, plus the typed
//! views handlers work with.

#![warn(missing_docs)]

// Core identities
mod id;
mod status;

// Records and kinds
mod kind;
mod job;
mod stage;
mod task;

// Payload handling
mod metadata;
mod error;

// Re-exports
pub use id::*;
pub use status::{JobStatus, StageStatus, TaskStatus, Priority};
pub use kind::{JobKind, StageKind, Payload};
pub use job::{Job, JobRecord, JobOf};
pub use stage::{Stage, StageRecord, StageOf, StageSummary};
pub use task::{Task, TaskRecord, TaskOf, DEFAULT_MAX_ATTEMPTS};
pub use metadata::{merge_metadata, decode_payload, encode_payload};
pub use error::{ModelError, Result};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
