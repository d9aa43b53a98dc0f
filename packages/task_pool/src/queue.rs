//! The work queue and the synchronization state shared between submitters,
//! workers and shutdown.
//!
//! One lock guards the queue and both shutdown flags. Two condition variables
//! hang off it: one wakes parked workers when work arrives (or when workers are
//! told to stop), the other wakes a draining shutdown once the queue has been
//! observed empty.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};

use crate::constants::ERR_POISONED_LOCK;
use crate::errors::PoolError;

/// Start-control for a queued task, as seen by the queue through type erasure.
///
/// The queue cannot know each task's output type, but it must decide at dequeue
/// time whether a popped item still gets to run. Implemented by the typed
/// completion cell behind every handle.
pub(crate) trait TaskLifecycle: Send + Sync {
    /// Attempts the Waiting → Running transition.
    ///
    /// Returns `false` if the task was cancelled while it sat in the queue, in
    /// which case the item is discarded without executing. No completion signal
    /// is sent for a discarded item - it already fired when the cancel happened.
    fn try_start(&self) -> bool;
}

/// A queued unit of work: the start-control handle paired with the closure that
/// executes the callable and publishes its outcome.
///
/// Lives only inside the queue. Removed by exactly one worker (or abandoned by
/// an abandoning shutdown), never re-inserted.
pub(crate) struct Task {
    lifecycle: Arc<dyn TaskLifecycle>,
    run: Box<dyn FnOnce() + Send>,
}

impl Task {
    pub(crate) fn new(lifecycle: Arc<dyn TaskLifecycle>, run: Box<dyn FnOnce() + Send>) -> Self {
        Self { lifecycle, run }
    }

    /// Executes the callable and publishes the outcome into the task's handle.
    ///
    /// Callers must not hold the queue lock here; execution of arbitrary caller
    /// code while holding it would serialize every submission and cancellation
    /// behind the running task.
    pub(crate) fn run(self) {
        (self.run)();
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

/// Everything guarded by the one pool lock.
#[derive(Debug)]
struct QueueState {
    /// Pending items in submission order.
    items: VecDeque<Task>,

    /// No new submissions are accepted. Set exactly once, when shutdown begins.
    closed: bool,

    /// Workers exit their loop instead of parking. Set exactly once, after any
    /// draining wait has finished.
    stop: bool,
}

/// The synchronization core shared by the pool, its workers and every submitter.
#[derive(Debug)]
pub(crate) struct PoolCore {
    state: Mutex<QueueState>,

    /// Wakes parked workers when work arrives or when workers are told to stop.
    work_available: Condvar,

    /// Wakes a draining shutdown once every queued item has been picked up.
    drained: Condvar,
}

impl PoolCore {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
                stop: false,
            }),
            work_available: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    /// Appends a task to the queue tail and wakes one parked worker.
    ///
    /// Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ShuttingDown`] once shutdown has begun; the task is
    /// dropped without ever becoming visible to workers.
    pub(crate) fn push(&self, task: Task) -> Result<(), PoolError> {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        if state.closed {
            return Err(PoolError::ShuttingDown);
        }

        state.items.push_back(task);
        drop(state);

        self.work_available.notify_one();
        Ok(())
    }

    /// Returns the next startable task, parking the calling worker while the
    /// queue is empty. Returns [`None`] once workers have been told to stop.
    ///
    /// The pop and the Waiting → Running transition happen under the same lock
    /// acquisition, which closes the cancel/dequeue race: an item can never
    /// start running after a successful cancel, and a cancel can never observe
    /// an item as waiting once it has been handed to a worker.
    pub(crate) fn next_task(&self) -> Option<Task> {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        loop {
            if state.stop {
                return None;
            }

            while let Some(task) = state.items.pop_front() {
                if state.items.is_empty() {
                    self.drained.notify_all();
                }

                if task.lifecycle.try_start() {
                    return Some(task);
                }

                // Cancelled while queued: drop the item silently and keep
                // looking for startable work.
            }

            self.drained.notify_all();
            state = self.work_available.wait(state).expect(ERR_POISONED_LOCK);
        }
    }

    /// Number of items currently queued (submitted but not yet picked up by
    /// any worker).
    pub(crate) fn len(&self) -> usize {
        self.state.lock().expect(ERR_POISONED_LOCK).items.len()
    }

    /// Stops accepting new submissions. The first half of every shutdown.
    pub(crate) fn close(&self) {
        self.state.lock().expect(ERR_POISONED_LOCK).closed = true;
    }

    /// Blocks until every queued item has been picked up by a worker.
    ///
    /// "Picked up" means dequeued (started or discarded-as-cancelled), not
    /// necessarily finished. Must only be called after [`close`][Self::close],
    /// otherwise a steady stream of submissions could keep this waiting forever.
    pub(crate) fn wait_until_drained(&self) {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        while !state.items.is_empty() {
            state = self.drained.wait(state).expect(ERR_POISONED_LOCK);
        }
    }

    /// Tells workers to exit their loop and wakes every parked one.
    pub(crate) fn stop_workers(&self) {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
        state.stop = true;
        drop(state);

        self.work_available.notify_all();
    }
}
