//! Threading primitives behind the transformer.
//!
//! - **queue**: bounded blocking FIFO (mutex + condition variable)
//! - **task**: unit of work with wait or callback completion
//! - **pool**: fixed set of worker threads draining one task queue

pub mod pool;
pub mod queue;
pub mod task;

pub use pool::{WorkerPool, WORKER_POLL_INTERVAL};
pub use queue::BoundedQueue;
pub use task::{Task, TaskCallback, TaskHandle, TaskOutcome};
