//! Task handling and worker registration.
//!
//! Handlers implement [`TaskHandler`] for one job kind and one stage kind;
//! [`create_worker`] binds a handler to an engine and returns a [`Worker`]
//! that claims, dispatches and reports tasks until stopped.

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod handler;
pub mod worker;
mod dispatch;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use context::TaskHandlerContext;
pub use error::{HandlerError, HandlerErrorKind, WorkerError};
pub use handler::TaskHandler;
pub use worker::{create_worker, Worker, WorkerOptions, WorkerStats, ABANDONED_REASON};
