//! The loop each pool thread runs.

use crate::queue::PoolCore;

/// Runs until shutdown: dequeue, execute, publish, repeat; parks when idle.
///
/// All the interesting decisions live in [`PoolCore::next_task`] (what to pop,
/// when to park, when to stop) and in the task's own run closure (outcome
/// capture and publication). Nothing a submitted callable does can take the
/// worker down, and the stop request is only observed between items, never
/// mid-execution.
#[cfg_attr(test, mutants::skip)] // Mutations here manifest as hangs rather than failures.
pub(crate) fn worker_entrypoint(core: &PoolCore) {
    while let Some(task) = core.next_task() {
        // The queue lock is not held at this point, so a long-running task
        // does not block submissions, cancellations or other workers.
        task.run();
    }
}
