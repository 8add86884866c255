//! Job and stage kinds.
//!
//! A kind ties a discriminant string to the payload shapes carried by every
//! record of that kind. Records travel through the engine type-erased; a kind
//! is how a handler gets its typed view back.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Bound shared by every payload type.
pub trait Payload: Serialize + DeserializeOwned + Clone + std::fmt::Debug + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + std::fmt::Debug + Send + Sync + 'static {}

/// A job type variant.
pub trait JobKind: Send + Sync + 'static {
    /// Discriminant stored in `Job::name`.
    const NAME: &'static str;

    /// Immutable job data.
    type Data: Payload;

    /// Handler-owned metadata. Fields should be optional so a value can be
    /// used as a partial update.
    type UserMetadata: Payload + Default;
}

/// A stage type variant, including the shape of its tasks.
pub trait StageKind: Send + Sync + 'static {
    /// Discriminant stored in `Stage::stage_type`.
    const NAME: &'static str;

    /// Immutable stage data.
    type Data: Payload;

    /// Handler-owned stage metadata.
    type UserMetadata: Payload + Default;

    /// Immutable task data.
    type TaskData: Payload;

    /// Handler-owned task metadata.
    type TaskUserMetadata: Payload + Default;
}
