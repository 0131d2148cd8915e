//! Job orchestration: admission, scheduling, and the worker pipeline.
//!
//! [`Facade`] is the single entry point for user-initiated operations;
//! [`JobQueue`] orders admitted work by tier priority; [`WorkerPool`]
//! drains the queue and drives each job through the engine.

pub mod facade;
pub mod pool;
pub mod queue;
pub mod upload;

pub use facade::{Facade, SubmitReceipt};
pub use pool::{WorkerContext, WorkerPool, DEFAULT_WORKERS};
pub use queue::{CancelOutcome, JobQueue, QueueError, QueuedJob};
