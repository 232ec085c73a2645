//! Fixed-size background work queue built on message passing
//!
//! # Features
//! - Rendezvous submission: `submit` returns once the dispatcher has the task
//! - Idle workers advertise themselves through a bounded handle registry
//! - Matching runs as lightweight futures, so accepting never waits on workers
//! - Panicking tasks are caught, reported, and the worker keeps serving
//! - Graceful, blocking shutdown that joins exactly the threads it started
//!
//! ```no_run
//! use workqueue::WorkQueue;
//!
//! let queue = WorkQueue::new(4)?;
//! for i in 0..16 {
//!     queue.submit(move || println!("task {i}"))?;
//! }
//! queue.close()?;
//! # Ok::<(), workqueue::PoolError>(())
//! ```

pub mod errors;
pub mod handle;
pub mod model;
pub mod pool;

mod dispatcher;
mod registry;
mod worker;

pub use errors::PoolError;
pub use handle::Task;
pub use model::{PanicHandler, PoolMetrics, TaskPanic};
pub use pool::{Config, WorkQueue};
