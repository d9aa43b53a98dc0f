// A poisoned lock means another thread panicked while holding pool or task state
// and we can no longer trust that state to be internally consistent, so we panic
// rather than continue execution.
pub(crate) const ERR_POISONED_LOCK: &str = "encountered poisoned lock - continued execution \
    is not safe because the pool state may no longer be internally consistent";
