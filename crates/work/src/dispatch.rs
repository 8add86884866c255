//! Type-erased bridge between claimed task records and a typed handler.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{JobKind, ModelError, StageKind, TaskRecord};
use courier_engine::{EngineClient, EngineError};
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::context::TaskHandlerContext;
use crate::error::HandlerError;
use crate::handler::TaskHandler;

/// Why a dispatch did not complete.
#[derive(Debug)]
pub(crate) enum DispatchError {
    /// Loading the job or stage snapshot failed
    Engine(EngineError),
    /// A record did not match the registered kinds
    Decode(ModelError),
    /// The handler returned an error
    Handler(HandlerError),
}

#[async_trait]
pub(crate) trait Dispatch: Send + Sync {
    /// Stage type this dispatcher serves.
    fn stage_type(&self) -> &'static str;

    /// Load snapshots, decode and run the handler for one claimed task.
    async fn dispatch(
        &self,
        task: TaskRecord,
        client: Arc<dyn EngineClient>,
        signal: CancellationToken,
        span: Span,
    ) -> Result<(), DispatchError>;
}

pub(crate) struct TypedDispatch<J, S, H> {
    handler: H,
    _kinds: PhantomData<fn() -> (J, S)>,
}

impl<J, S, H> TypedDispatch<J, S, H> {
    pub(crate) fn new(handler: H) -> Self {
        Self {
            handler,
            _kinds: PhantomData,
        }
    }
}

#[async_trait]
impl<J, S, H> Dispatch for TypedDispatch<J, S, H>
where
    J: JobKind,
    S: StageKind,
    H: TaskHandler<J, S>,
{
    fn stage_type(&self) -> &'static str {
        S::NAME
    }

    async fn dispatch(
        &self,
        task: TaskRecord,
        client: Arc<dyn EngineClient>,
        signal: CancellationToken,
        span: Span,
    ) -> Result<(), DispatchError> {
        let typed_task = task.decode::<S>().map_err(DispatchError::Decode)?;

        let stage = client
            .get_stage(task.stage_id)
            .await
            .map_err(DispatchError::Engine)?;
        span.record("job.id", tracing::field::display(stage.job_id));
        let stage = stage.decode::<S>().map_err(DispatchError::Decode)?;

        let job = client
            .get_job(stage.job_id)
            .await
            .map_err(DispatchError::Engine)?
            .decode::<J>()
            .map_err(DispatchError::Decode)?;

        let ctx = TaskHandlerContext::new(job, stage, task.id, client, signal).with_span(span);
        self.handler
            .handle(&typed_task, &ctx)
            .await
            .map_err(DispatchError::Handler)
    }
}
