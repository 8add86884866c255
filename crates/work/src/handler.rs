//! Task handler contract.

use async_trait::async_trait;
use courier_core::{JobKind, StageKind, TaskOf};

use crate::context::TaskHandlerContext;
use crate::error::HandlerError;

/// Processes claimed tasks of stage kind `S` belonging to jobs of kind `J`.
///
/// Invoked once per claimed attempt. Validation comes first: on a violation
/// return [`HandlerError::Validation`] before doing any work or updating any
/// metadata. Long waits must observe [`TaskHandlerContext::signal`].
/// Returning `Ok` completes the attempt; returning `Err` fails it and leaves
/// retry decisions to the engine.
#[async_trait]
pub trait TaskHandler<J: JobKind, S: StageKind>: Send + Sync + 'static {
    /// Handle one task.
    async fn handle(
        &self,
        task: &TaskOf<S>,
        ctx: &TaskHandlerContext<J, S>,
    ) -> Result<(), HandlerError>;
}
