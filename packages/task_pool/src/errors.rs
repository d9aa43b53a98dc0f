//! Error types surfaced by the pool and by task handles.

use std::any::Any;
use std::sync::Arc;

/// The captured failure of a task whose callable panicked.
///
/// The failure is stored once, by the worker that executed the task, and a clone
/// of it is re-delivered to every waiter on the task's handle. Retrieval never
/// re-runs the task.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct TaskFailure {
    message: Arc<str>,
}

impl TaskFailure {
    /// Converts a panic payload (as returned by `panic::catch_unwind`) into a
    /// clonable failure record.
    ///
    /// Panic payloads are almost always `&str` or `String`; anything else is
    /// recorded with a placeholder message because the payload itself cannot be
    /// cloned for repeated delivery.
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "task panicked with a non-string payload".to_owned());

        Self {
            message: Arc::from(message),
        }
    }

    /// The panic message of the failed task.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Error returned when retrieving the outcome of a task through its handle.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TaskError {
    /// The task's callable panicked; the original failure is re-delivered to
    /// every retrieval, unchanged.
    #[error("task failed: {0}")]
    Failed(#[from] TaskFailure),

    /// The task was cancelled while it was still waiting in the queue.
    /// Its callable never ran and never will.
    #[error("task was cancelled before it started")]
    Cancelled,

    /// The wait elapsed before the task reached a terminal state. The task
    /// itself is unaffected and the handle remains waitable.
    #[error("timed out waiting for the task to complete")]
    Timeout,
}

/// Error returned by pool operations that violate the pool's lifecycle contract.
///
/// These are programming errors on the caller's side. They are fatal to the
/// offending call only; the pool itself remains in a well-defined state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum PoolError {
    /// A task was submitted after shutdown had already begun.
    #[error("the pool no longer accepts tasks because shutdown has begun")]
    ShuttingDown,

    /// Shutdown was requested a second time. A pool can be shut down at
    /// most once.
    #[error("the pool has already been shut down")]
    AlreadyShutDown,

    /// A worker thread had already exited when shutdown was requested. This
    /// indicates a defect in the pool itself, since task failures never take
    /// down a worker. The pool is left untouched by the failed call.
    #[error("a worker thread exited before shutdown was requested")]
    WorkerFailed,
}
