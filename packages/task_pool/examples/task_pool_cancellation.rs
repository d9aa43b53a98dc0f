//! Demonstrates the two shutdown disciplines and queue-edge cancellation.

use std::error::Error;
use std::sync::mpsc;
use std::time::Duration;

use new_zealand::nz;
use task_pool::{ShutdownMode, TaskError, TaskPool};

fn main() -> Result<(), Box<dyn Error>> {
    let pool = TaskPool::new(nz!(1));

    // Occupy the only worker so the next submission stays queued.
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let busy = pool.submit(move || {
        started_tx.send(()).expect("example main thread is still listening");
        release_rx.recv()
    })?;
    started_rx.recv()?;

    let queued = pool.submit(|| "this never runs")?;

    // Still queued, so cancellation reaches it in time.
    assert!(queued.cancel());
    match queued.wait() {
        Err(TaskError::Cancelled) => println!("queued task was cancelled before it started"),
        other => println!("unexpected outcome: {other:?}"),
    }

    // The running task is beyond cancellation; it finishes normally.
    assert!(!busy.cancel());
    release_tx.send(())?;
    busy.wait_timeout(Duration::from_secs(1))??;

    pool.shutdown(ShutdownMode::Drain)?;
    println!("pool drained and all workers joined");
    Ok(())
}
