//! Job engine boundary for Courier.
//!
//! The worker talks to the engine through [`EngineClient`]; producers seed
//! work through [`Producer`]. [`MemoryEngine`] implements both in-process.

#![warn(missing_docs)]

pub mod trait_;
pub mod spec;
pub mod memory;

pub use trait_::{EngineClient, EngineError, Producer, Result};
pub use spec::{JobSpec, StageSpec, TaskSpec};
pub use memory::MemoryEngine;
