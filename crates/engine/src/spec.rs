//! Creation requests for the producer side.

use courier_core::{encode_payload, JobKind, Priority, StageKind, DEFAULT_MAX_ATTEMPTS};
use serde_json::Value;

use crate::Result;

/// Request to create a job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Job type discriminant
    pub name: String,
    /// Scheduling priority
    pub priority: Priority,
    /// Immutable job data
    pub data: Value,
    /// Initial user metadata
    pub user_metadata: Value,
}

impl JobSpec {
    /// Build a spec for a job of kind `J`.
    pub fn typed<J: JobKind>(
        priority: Priority,
        data: &J::Data,
        user_metadata: &J::UserMetadata,
    ) -> Result<Self> {
        Ok(Self {
            name: J::NAME.to_string(),
            priority,
            data: encode_payload(data, "data")?,
            user_metadata: encode_payload(user_metadata, "userMetadata")?,
        })
    }
}

/// Request to create a stage.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// Stage type discriminant
    pub stage_type: String,
    /// Immutable stage data
    pub data: Value,
    /// Initial user metadata
    pub user_metadata: Value,
}

impl StageSpec {
    /// Build a spec for a stage of kind `S`.
    pub fn typed<S: StageKind>(data: &S::Data, user_metadata: &S::UserMetadata) -> Result<Self> {
        Ok(Self {
            stage_type: S::NAME.to_string(),
            data: encode_payload(data, "data")?,
            user_metadata: encode_payload(user_metadata, "userMetadata")?,
        })
    }
}

/// Request to create a task.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Immutable task data
    pub data: Value,
    /// Initial user metadata
    pub user_metadata: Value,
    /// Attempt ceiling
    pub max_attempts: u32,
}

impl TaskSpec {
    /// Build a spec from raw task data.
    pub fn new(data: Value) -> Self {
        Self {
            data,
            user_metadata: Value::Object(Default::default()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Build a spec for a task of a stage of kind `S`.
    pub fn typed<S: StageKind>(data: &S::TaskData) -> Result<Self> {
        Ok(Self {
            data: encode_payload(data, "data")?,
            user_metadata: Value::Object(Default::default()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        })
    }

    /// Set the attempt ceiling.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}
