//! Completion handles for submitted tasks.
//!
//! Every submission produces one [`TaskHandle`], backed by a single-assignment
//! completion cell that the executing worker (or a successful cancellation)
//! writes exactly once. Handles are cheap to clone and any number of threads may
//! observe or wait on the same task concurrently.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::constants::ERR_POISONED_LOCK;
use crate::errors::{TaskError, TaskFailure};
use crate::queue::TaskLifecycle;

/// State of a submitted task.
///
/// Transitions are monotonic: nothing ever leaves `Completed` or `Cancelled`,
/// and the completion signal fires exactly once, on the transition into either
/// of those two states.
#[derive(Debug)]
enum TaskState<T> {
    /// Queued and not yet picked up by a worker. The only cancellable state.
    Waiting,

    /// A worker is executing the callable. Cancellation no longer has any effect.
    Running,

    /// The callable finished, either with a value or with a captured failure.
    Completed(Result<T, TaskFailure>),

    /// Cancelled while still queued. The callable never ran and never will.
    Cancelled,
}

impl<T> TaskState<T> {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Cancelled)
    }
}

/// The single-assignment completion cell shared between handle clones and the
/// worker that executes the task.
///
/// Every state transition funnels through the methods of this type, under its
/// one lock. This is what makes the cancellation contract airtight: the
/// Waiting → Running transition ([`try_start`][TaskLifecycle::try_start], called
/// by the queue at dequeue time) and the Waiting → Cancelled transition
/// ([`cancel`][TaskCore::cancel]) contend for the same lock, so a task can never
/// start running after a successful cancel.
#[derive(Debug)]
pub(crate) struct TaskCore<T> {
    state: Mutex<TaskState<T>>,

    /// The completion signal: notified when the state becomes terminal.
    completed: Condvar,
}

impl<T> TaskCore<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(TaskState::Waiting),
            completed: Condvar::new(),
        }
    }

    /// Publishes the outcome of the executed callable and fires the
    /// completion signal.
    ///
    /// Called exactly once, by the one worker that started the task. No other
    /// writer can race it: cancellation is excluded because the task already
    /// left `Waiting`, and no second worker can ever hold the same task.
    pub(crate) fn complete(&self, outcome: Result<T, TaskFailure>) {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        match &*state {
            TaskState::Running => *state = TaskState::Completed(outcome),
            _ => unreachable!("only the worker that started a task may complete it"),
        }

        drop(state);
        self.completed.notify_all();
    }

    /// Cancels the task if it has not started yet.
    ///
    /// Returns `true` and fires the completion signal if the task was still
    /// waiting; returns `false` without any mutation otherwise. Cancellation
    /// never interrupts in-progress work.
    pub(crate) fn cancel(&self) -> bool {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        let cancelled = match &*state {
            TaskState::Waiting => {
                *state = TaskState::Cancelled;
                true
            }
            _ => false,
        };

        drop(state);

        if cancelled {
            self.completed.notify_all();
        }

        cancelled
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state.lock().expect(ERR_POISONED_LOCK).is_terminal()
    }

    /// Blocks on the completion signal until the task reaches a terminal state
    /// or the deadline derived from `timeout` passes.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> Result<T, TaskError>
    where
        T: Clone,
    {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        loop {
            match &*state {
                TaskState::Completed(Ok(value)) => return Ok(value.clone()),
                TaskState::Completed(Err(failure)) => {
                    return Err(TaskError::Failed(failure.clone()));
                }
                TaskState::Cancelled => return Err(TaskError::Cancelled),
                TaskState::Waiting | TaskState::Running => {}
            }

            state = match deadline {
                None => self.completed.wait(state).expect(ERR_POISONED_LOCK),
                Some(deadline) => {
                    let now = Instant::now();

                    if now >= deadline {
                        // The task is unaffected; the handle remains waitable.
                        return Err(TaskError::Timeout);
                    }

                    self.completed
                        .wait_timeout(state, deadline - now)
                        .expect(ERR_POISONED_LOCK)
                        .0
                }
            };
        }
    }
}

impl<T> TaskLifecycle for TaskCore<T>
where
    T: Send,
{
    fn try_start(&self) -> bool {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        match &*state {
            TaskState::Waiting => {
                *state = TaskState::Running;
                true
            }
            // Cancelled while queued. The completion signal already fired when
            // the cancel happened, so the item is simply discarded.
            TaskState::Cancelled => false,
            TaskState::Running | TaskState::Completed(_) => {
                unreachable!("a queued task is popped by exactly one worker, exactly once")
            }
        }
    }
}

/// Handle to the eventual outcome of one submitted task.
///
/// Returned by [`TaskPool::submit`][crate::TaskPool::submit]. The handle can be
/// cloned and shared freely; all clones observe the same task.
///
/// # Example
///
/// ```rust
/// use new_zealand::nz;
/// use task_pool::TaskPool;
///
/// let pool = TaskPool::new(nz!(2));
///
/// let handle = pool.submit(|| 2 + 2)?;
/// assert_eq!(handle.wait()?, 4);
/// assert!(handle.is_done());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct TaskHandle<T> {
    core: Arc<TaskCore<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> TaskHandle<T>
where
    T: Send,
{
    pub(crate) fn new(core: Arc<TaskCore<T>>) -> Self {
        Self { core }
    }

    /// Returns whether the task has reached a terminal state (completed
    /// or cancelled).
    ///
    /// Non-blocking, side-effect free and safe to call from any thread.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.core.is_done()
    }

    /// Cancels the task if no worker has started executing it yet.
    ///
    /// Returns `true` if the task was still queued: its callable will never run
    /// and every waiter is released with [`TaskError::Cancelled`]. Returns
    /// `false` if the task is already running, completed or cancelled;
    /// cancellation never interrupts in-progress work.
    ///
    /// # Example
    ///
    /// ```rust
    /// use new_zealand::nz;
    /// use task_pool::TaskPool;
    ///
    /// let pool = TaskPool::new(nz!(1));
    ///
    /// let handle = pool.submit(|| "ran anyway")?;
    /// handle.wait()?;
    ///
    /// // Too late - the task already completed.
    /// assert!(!handle.cancel());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn cancel(&self) -> bool {
        self.core.cancel()
    }

    /// Blocks until the task reaches a terminal state and returns its outcome.
    ///
    /// Retrieval is idempotent: every call (from any number of threads, in any
    /// order) observes the same value or the same failure. The task is never
    /// re-run.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Failed`] if the callable panicked and
    /// [`TaskError::Cancelled`] if the task was cancelled before it started.
    pub fn wait(&self) -> Result<T, TaskError>
    where
        T: Clone,
    {
        self.core.wait(None)
    }

    /// Blocks until the task reaches a terminal state or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// In addition to the [`wait`][Self::wait] errors, returns
    /// [`TaskError::Timeout`] if the task did not reach a terminal state in
    /// time. Timing out has no effect on the task; the handle remains waitable.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, TaskError>
    where
        T: Clone,
    {
        self.core.wait(Some(timeout))
    }
}
