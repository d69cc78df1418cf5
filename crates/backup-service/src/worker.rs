use std::sync::Arc;

use thiserror::Error;
use tokio::{
    sync::{AcquireError, Semaphore},
    task::{JoinError, spawn_blocking},
};

/// Runs blocking archive work off the async runtime, at most `size` jobs at once.
///
/// Jobs over the limit wait for a free worker.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// A pool running up to `maximum_workers` jobs at once, at least one.
    pub fn new(maximum_workers: usize) -> Self {
        let size = maximum_workers.max(1);

        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// The maximum number of jobs running at once.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The number of idle workers.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free worker then run `job` on it.
    pub async fn run<T, F>(&self, job: F) -> Result<T, WorkerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits).acquire_owned().await?;

        let handle = spawn_blocking(move || {
            // Held until the job itself has finished.
            let _permit = permit;
            job()
        });

        handle.await.map_err(WorkerError::Panicked)
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker pool is closed: {0}")]
    Closed(#[from] AcquireError),

    #[error("Worker job did not complete: {0}")]
    Panicked(#[source] JoinError),
}
