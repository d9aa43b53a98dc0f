//! Submits a batch of tasks and retrieves each result through its handle.

use std::error::Error;

use new_zealand::nz;
use task_pool::{ShutdownMode, TaskPool};

fn main() -> Result<(), Box<dyn Error>> {
    let pool = TaskPool::new(nz!(4));
    println!("started a pool with {} workers", pool.worker_count());

    let handles: Vec<_> = (1_u64..=10)
        .map(|i| pool.submit(move || i * i))
        .collect::<Result<_, _>>()?;

    for (i, handle) in (1_u64..).zip(&handles) {
        println!("{i} squared is {}", handle.wait()?);
    }

    pool.shutdown(ShutdownMode::Drain)?;
    Ok(())
}
