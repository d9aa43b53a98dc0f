//! The public pool type: owns the worker threads for its entire lifetime.

use std::num::NonZero;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::constants::ERR_POISONED_LOCK;
use crate::errors::{PoolError, TaskFailure};
use crate::handle::{TaskCore, TaskHandle};
use crate::queue::{PoolCore, Task, TaskLifecycle};
use crate::worker;

/// Selects what happens to queued-but-unstarted items when the pool shuts down.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ShutdownMode {
    /// Waits until every queued item has been picked up by a worker before
    /// stopping them, so everything submitted before the shutdown call runs to
    /// completion (or was already terminal) by the time shutdown returns.
    Drain,

    /// Stops workers immediately. Items no worker had picked up yet are
    /// abandoned: they stay in the queue and their handles never resolve.
    /// Items already executing finish normally - workers are never
    /// interrupted mid-task.
    Abandon,
}

/// A fixed-size pool of worker threads executing submitted tasks asynchronously.
///
/// Each submission returns a [`TaskHandle`] for retrieving the eventual result,
/// cancelling not-yet-started work and observing completion. The worker threads
/// are created up front and live until [`shutdown`][TaskPool::shutdown]; the
/// pool is never resized.
///
/// Items are executed in submission order (FIFO). No ordering guarantee exists
/// between *completion* times of different tasks.
///
/// # Example
///
/// ```rust
/// use new_zealand::nz;
/// use task_pool::{ShutdownMode, TaskPool};
///
/// let pool = TaskPool::new(nz!(4));
///
/// let handles: Vec<_> = (0..16_usize)
///     .map(|i| pool.submit(move || i * i))
///     .collect::<Result<_, _>>()?;
///
/// pool.shutdown(ShutdownMode::Drain)?;
///
/// for (i, handle) in handles.iter().enumerate() {
///     assert_eq!(handle.wait()?, i * i);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// # Lifecycle
///
/// Dropping the pool performs a draining shutdown if none happened explicitly,
/// so a pool can never leak live worker threads on scope exit - including exits
/// via error propagation.
#[derive(Debug)]
pub struct TaskPool {
    core: Arc<PoolCore>,

    /// Taken, exactly once, by the one permitted shutdown.
    workers: Mutex<Option<Vec<JoinHandle<()>>>>,

    worker_count: NonZero<usize>,
}

impl TaskPool {
    /// Creates a pool and starts `worker_count` worker threads immediately.
    ///
    /// # Example
    ///
    /// ```rust
    /// use new_zealand::nz;
    /// use task_pool::TaskPool;
    ///
    /// let pool = TaskPool::new(nz!(2));
    /// assert_eq!(pool.worker_count().get(), 2);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to spawn a thread.
    #[must_use]
    pub fn new(worker_count: NonZero<usize>) -> Self {
        let core = Arc::new(PoolCore::new());

        let workers = (0..worker_count.get())
            .map(|index| {
                let core = Arc::clone(&core);

                thread::Builder::new()
                    .name(format!("task-pool-{index}"))
                    .spawn(move || worker::worker_entrypoint(&core))
                    .expect("failed to spawn pool worker thread")
            })
            .collect();

        Self {
            core,
            workers: Mutex::new(Some(workers)),
            worker_count,
        }
    }

    /// The number of worker threads, as fixed at construction.
    #[must_use]
    pub fn worker_count(&self) -> NonZero<usize> {
        self.worker_count
    }

    /// The number of submitted items no worker has picked up yet.
    ///
    /// After an abandoning shutdown this reports how many items were left
    /// unexecuted.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.core.len()
    }

    /// Submits a task for asynchronous execution and returns its handle
    /// without blocking.
    ///
    /// Exactly one worker will eventually execute the task, unless it is
    /// cancelled first or abandoned by a non-draining shutdown. A panic inside
    /// the callable is captured into the handle and never crashes the worker.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ShuttingDown`] once shutdown has begun. Submitting
    /// to a pool that is going away is a programming error, not a silent no-op.
    ///
    /// # Example
    ///
    /// ```rust
    /// use new_zealand::nz;
    /// use task_pool::TaskPool;
    ///
    /// let pool = TaskPool::new(nz!(1));
    ///
    /// let input = vec![3, 5, 8];
    /// let handle = pool.submit(move || input.iter().sum::<i32>())?;
    ///
    /// assert_eq!(handle.wait()?, 16);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn submit<F, T>(&self, f: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let core = Arc::new(TaskCore::new());

        let run = Box::new({
            let core = Arc::clone(&core);
            move || {
                // A panicking callable must not take the worker down; the
                // failure is captured and re-surfaced through the handle. The
                // unwind-safety assertion is sound because `f` is consumed
                // here and nothing observes its state after a panic.
                let outcome = panic::catch_unwind(AssertUnwindSafe(f))
                    .map_err(|payload| TaskFailure::from_panic(payload.as_ref()));

                core.complete(outcome);
            }
        });

        self.core
            .push(Task::new(Arc::clone(&core) as Arc<dyn TaskLifecycle>, run))?;

        Ok(TaskHandle::new(core))
    }

    /// Shuts the pool down and joins every worker thread.
    ///
    /// May be invoked at most once per pool. Once this returns, no worker
    /// threads remain alive and no new work is accepted.
    ///
    /// [`ShutdownMode::Drain`] first blocks until every queued item has been
    /// picked up, guaranteeing all pre-shutdown submissions are executed.
    /// [`ShutdownMode::Abandon`] stops workers as soon as their current item
    /// (if any) finishes, leaving unstarted items unresolved forever.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::AlreadyShutDown`] on a second invocation and
    /// [`PoolError::WorkerFailed`] if a worker thread had already exited, in
    /// which case the pool is left untouched. Both are programming errors,
    /// fatal to the offending call only.
    pub fn shutdown(&self, mode: ShutdownMode) -> Result<(), PoolError> {
        let mut workers_guard = self.workers.lock().expect(ERR_POISONED_LOCK);

        let workers = workers_guard.take().ok_or(PoolError::AlreadyShutDown)?;

        if workers.iter().any(JoinHandle::is_finished) {
            // Task failures are captured, so a dead worker means a defect in
            // the pool itself. Report it without committing to the shutdown.
            *workers_guard = Some(workers);
            return Err(PoolError::WorkerFailed);
        }

        self.core.close();

        if mode == ShutdownMode::Drain {
            self.core.wait_until_drained();
        }

        self.core.stop_workers();

        for worker in workers {
            // Workers never panic: callable failures are captured inside the
            // run closure, so a join error here is a bug in the pool itself.
            worker.join().expect("pool worker thread panicked");
        }

        Ok(())
    }
}

impl Default for TaskPool {
    /// Creates a pool with one worker per available processor.
    fn default() -> Self {
        Self::new(
            thread::available_parallelism()
                .expect("could not determine the available parallelism of the host"),
        )
    }
}

impl Drop for TaskPool {
    #[cfg_attr(test, mutants::skip)] // Impractical to test that stuff stops happening.
    fn drop(&mut self) {
        if thread::panicking() {
            // We are probably in a dirty state and a draining shutdown may hang
            // or hide the original panic, so just do nothing.
            return;
        }

        // Scope exit guarantees a draining shutdown exactly once on every exit
        // path. An explicitly shut down pool reports AlreadyShutDown here,
        // which is the expected outcome.
        drop(self.shutdown(ShutdownMode::Drain));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    use new_zealand::nz;
    use static_assertions::assert_impl_all;
    use testing::with_watchdog;

    use super::*;
    use crate::errors::TaskError;

    #[test]
    fn thread_safe_types() {
        assert_impl_all!(TaskPool: Send, Sync);
        assert_impl_all!(ShutdownMode: Copy, Send, Sync);
    }

    #[test]
    fn new_pool_starts_idle() {
        with_watchdog(|| {
            let pool = TaskPool::new(nz!(5));
            assert_eq!(pool.worker_count().get(), 5);
            assert_eq!(pool.pending_count(), 0);
        });
    }

    #[test]
    fn default_pool_executes_work() {
        with_watchdog(|| {
            let pool = TaskPool::default();
            let handle = pool.submit(|| 1 + 1).unwrap();
            assert_eq!(handle.wait().unwrap(), 2);
        });
    }

    #[test]
    fn gated_task_completes_when_released() {
        // Scenario: a task blocked on an external signal is not done; once the
        // signal is released the result arrives and the handle is done.
        with_watchdog(|| {
            let pool = TaskPool::new(nz!(1));
            let (release_tx, release_rx) = mpsc::channel::<()>();

            let handle = pool
                .submit(move || {
                    release_rx.recv().unwrap();
                    5
                })
                .unwrap();

            assert!(!handle.is_done());

            release_tx.send(()).unwrap();

            assert_eq!(handle.wait().unwrap(), 5);
            assert!(handle.is_done());
        });
    }

    #[test]
    fn panicking_task_resurfaces_failure() {
        with_watchdog(|| {
            let pool = TaskPool::new(nz!(1));

            let handle = pool.submit(|| -> u32 { panic!("deliberate failure") }).unwrap();

            // Re-delivered identically on every retrieval; the task never re-runs.
            for _ in 0..2 {
                match handle.wait() {
                    Err(TaskError::Failed(failure)) => {
                        assert_eq!(failure.message(), "deliberate failure");
                    }
                    other => panic!("expected the captured failure, got {other:?}"),
                }
            }

            assert!(handle.is_done());

            // The worker survived the panic and keeps executing work.
            let next = pool.submit(|| 3).unwrap();
            assert_eq!(next.wait().unwrap(), 3);
        });
    }

    #[test]
    fn many_tasks_all_resolve_after_draining_shutdown() {
        // Scenario: 8 workers, 1000 tasks each returning a distinct index.
        with_watchdog(|| {
            let pool = TaskPool::new(nz!(8));

            let handles: Vec<_> = (0..1000_usize)
                .map(|i| pool.submit(move || i).unwrap())
                .collect();

            pool.shutdown(ShutdownMode::Drain).unwrap();
            assert_eq!(pool.pending_count(), 0);

            for (i, handle) in handles.iter().enumerate() {
                assert!(handle.is_done());
                assert_eq!(handle.wait().unwrap(), i);
            }
        });
    }

    #[test]
    fn abandoning_shutdown_leaves_unstarted_items_queued() {
        // Scenario: 8 workers, 100 sleeper tasks, prompt abandoning shutdown.
        with_watchdog(|| {
            let pool = TaskPool::new(nz!(8));
            let executed = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = (0..100)
                .map(|_| {
                    let executed = Arc::clone(&executed);
                    pool.submit(move || {
                        thread::sleep(Duration::from_millis(50));
                        executed.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap()
                })
                .collect();

            pool.shutdown(ShutdownMode::Abandon).unwrap();

            // Every worker has been joined, so nothing is in flight: every item
            // was either executed to completion or never popped at all.
            let executed = executed.load(Ordering::SeqCst);
            assert!(pool.pending_count() > 0);
            assert_eq!(executed + pool.pending_count(), 100);

            let resolved = handles.iter().filter(|handle| handle.is_done()).count();
            assert_eq!(resolved, executed);
        });
    }

    #[test]
    fn single_worker_executes_in_submission_order() {
        with_watchdog(|| {
            let pool = TaskPool::new(nz!(1));
            let order = Arc::new(Mutex::new(Vec::new()));
            let (gate_tx, gate_rx) = mpsc::channel::<()>();

            // Hold the only worker so the remaining submissions queue up.
            let gate = pool.submit(move || gate_rx.recv().unwrap()).unwrap();

            let handles: Vec<_> = (0..3)
                .map(|i| {
                    let order = Arc::clone(&order);
                    pool.submit(move || order.lock().unwrap().push(i)).unwrap()
                })
                .collect();

            gate_tx.send(()).unwrap();
            gate.wait().unwrap();

            pool.shutdown(ShutdownMode::Drain).unwrap();

            for handle in handles {
                handle.wait().unwrap();
            }

            assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        });
    }

    #[test]
    fn cancel_prevents_execution_when_workers_are_busy() {
        // Scenario: all four workers are parked inside tasks, so a fifth task
        // must sit in the queue where cancellation can still reach it.
        with_watchdog(|| {
            let pool = TaskPool::new(nz!(4));
            let entry = Arc::new(Barrier::new(5));
            let exit = Arc::new(Barrier::new(5));

            let blockers: Vec<_> = (0..4)
                .map(|_| {
                    let entry = Arc::clone(&entry);
                    let exit = Arc::clone(&exit);
                    pool.submit(move || {
                        entry.wait();
                        exit.wait();
                    })
                    .unwrap()
                })
                .collect();

            // All four workers are now executing.
            entry.wait();

            let ran = Arc::new(AtomicBool::new(false));
            let victim = pool
                .submit({
                    let ran = Arc::clone(&ran);
                    move || ran.store(true, Ordering::SeqCst)
                })
                .unwrap();

            assert!(victim.cancel());
            assert!(victim.is_done());

            // Cancellation of a terminal task reports failure without mutation.
            assert!(!victim.cancel());

            exit.wait();
            pool.shutdown(ShutdownMode::Drain).unwrap();

            assert!(matches!(victim.wait(), Err(TaskError::Cancelled)));
            assert!(!ran.load(Ordering::SeqCst));

            for blocker in blockers {
                blocker.wait().unwrap();
            }
        });
    }

    #[test]
    fn cancel_fails_for_running_task() {
        with_watchdog(|| {
            let pool = TaskPool::new(nz!(1));
            let (started_tx, started_rx) = mpsc::channel::<()>();
            let (release_tx, release_rx) = mpsc::channel::<()>();

            let handle = pool
                .submit(move || {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                })
                .unwrap();

            started_rx.recv().unwrap();
            assert!(!handle.cancel());

            release_tx.send(()).unwrap();
            handle.wait().unwrap();
        });
    }

    #[test]
    fn wait_timeout_expires_without_cancelling() {
        with_watchdog(|| {
            let pool = TaskPool::new(nz!(1));
            let (release_tx, release_rx) = mpsc::channel::<()>();

            let handle = pool
                .submit(move || {
                    release_rx.recv().unwrap();
                    "slow but steady"
                })
                .unwrap();

            assert!(matches!(
                handle.wait_timeout(Duration::from_millis(10)),
                Err(TaskError::Timeout)
            ));
            assert!(!handle.is_done());

            release_tx.send(()).unwrap();
            assert_eq!(handle.wait().unwrap(), "slow but steady");
        });
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        with_watchdog(|| {
            let pool = TaskPool::new(nz!(2));
            pool.shutdown(ShutdownMode::Drain).unwrap();

            assert_eq!(
                pool.submit(|| ()).expect_err("pool should be closed"),
                PoolError::ShuttingDown
            );
        });
    }

    #[test]
    fn second_shutdown_is_rejected() {
        with_watchdog(|| {
            let pool = TaskPool::new(nz!(2));
            pool.shutdown(ShutdownMode::Abandon).unwrap();

            assert_eq!(
                pool.shutdown(ShutdownMode::Drain),
                Err(PoolError::AlreadyShutDown)
            );
        });
    }

    #[test]
    fn shutdown_of_idle_pool_returns_promptly() {
        with_watchdog(|| {
            let pool = TaskPool::new(nz!(4));
            pool.shutdown(ShutdownMode::Drain).unwrap();
            assert_eq!(pool.pending_count(), 0);
        });
    }

    #[test]
    fn drop_performs_draining_shutdown() {
        with_watchdog(|| {
            let executed = Arc::new(AtomicUsize::new(0));

            {
                let pool = TaskPool::new(nz!(2));

                for _ in 0..32 {
                    let executed = Arc::clone(&executed);
                    pool.submit(move || {
                        executed.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
                }

                // The pool leaves scope here without an explicit shutdown.
            }

            assert_eq!(executed.load(Ordering::SeqCst), 32);
        });
    }

    #[test]
    fn handles_outlive_the_pool() {
        with_watchdog(|| {
            let pool = TaskPool::new(nz!(2));
            let handle = pool.submit(|| 11).unwrap();

            pool.shutdown(ShutdownMode::Drain).unwrap();
            drop(pool);

            assert_eq!(handle.wait().unwrap(), 11);
        });
    }
}
