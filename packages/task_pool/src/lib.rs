//! Fixed-size worker thread pool with cancellable completion handles.
//!
//! A [`TaskPool`] owns a fixed set of worker threads for its entire lifetime and
//! executes submitted closures asynchronously. Every submission immediately
//! returns a [`TaskHandle`] that any number of threads can use to wait for the
//! result (with or without a timeout), cancel the task while it is still
//! queued, or observe completion.
//!
//! Tasks are executed in submission order (FIFO). A panic inside a task is
//! captured into its handle and re-delivered to every waiter; it never takes a
//! worker thread down. Shutdown comes in two disciplines: draining
//! ([`ShutdownMode::Drain`]), which guarantees every pre-shutdown submission is
//! executed, and abandoning ([`ShutdownMode::Abandon`]), which stops workers as
//! soon as their current task finishes and leaves unstarted items unresolved.
//!
//! # Example
//!
//! ```rust
//! use new_zealand::nz;
//! use task_pool::{ShutdownMode, TaskPool};
//!
//! let pool = TaskPool::new(nz!(4));
//!
//! let handle = pool.submit(|| {
//!     // Any work that should happen off the current thread.
//!     (1..=10).product::<u64>()
//! })?;
//!
//! assert_eq!(handle.wait()?, 3_628_800);
//!
//! pool.shutdown(ShutdownMode::Drain)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Cancellation
//!
//! Cancellation is cooperative at the queue edge only: it prevents a queued
//! task from ever starting but never interrupts one that a worker has already
//! picked up.
//!
//! ```rust
//! use new_zealand::nz;
//! use task_pool::TaskPool;
//!
//! let pool = TaskPool::new(nz!(1));
//!
//! let handle = pool.submit(|| "ran to completion")?;
//!
//! // Whether this succeeds depends on whether the worker got there first;
//! // either way, the outcome is well-defined and observable.
//! if !handle.cancel() {
//!     assert_eq!(handle.wait()?, "ran to completion");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod constants;
mod errors;
mod handle;
mod pool;
mod queue;
mod worker;

pub use errors::{PoolError, TaskError, TaskFailure};
pub use handle::TaskHandle;
pub use pool::{ShutdownMode, TaskPool};
