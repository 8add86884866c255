//! Job model - the top-level unit of business intent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::id::JobId;
use crate::kind::JobKind;
use crate::metadata::decode_payload;
use crate::status::{JobStatus, Priority};
use crate::Time;

/// A job as stored by the engine, with payloads of type `D` and `M`.
///
/// `Job` with the default parameters is the type-erased wire record; see
/// [`JobOf`] for the typed view of a [`JobKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job<D = Value, M = Value> {
    /// Unique identifier
    pub id: JobId,

    /// Job type discriminant
    pub name: String,

    /// Current status (owned by the engine)
    pub status: JobStatus,

    /// Scheduling priority
    #[serde(default)]
    pub priority: Priority,

    /// Creation timestamp
    pub creation_time: Time,

    /// Immutable job data
    pub data: D,

    /// Handler-owned metadata
    pub user_metadata: M,

    /// W3C trace context of the producer, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceparent: Option<String>,
}

/// Type-erased job record.
pub type JobRecord = Job;

/// Typed view of a job of kind `J`.
pub type JobOf<J> = Job<<J as JobKind>::Data, <J as JobKind>::UserMetadata>;

impl JobRecord {
    /// Decode the record as a job of kind `J`.
    pub fn decode<J: JobKind>(&self) -> Result<JobOf<J>> {
        if self.name != J::NAME {
            return Err(ModelError::KindMismatch {
                entity: "job",
                expected: J::NAME,
                found: self.name.clone(),
            });
        }

        Ok(Job {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            priority: self.priority,
            creation_time: self.creation_time,
            data: decode_payload(&self.data, "data")?,
            user_metadata: decode_payload(&self.user_metadata, "userMetadata")?,
            traceparent: self.traceparent.clone(),
        })
    }
}
