//! Bounded worker pool for CPU-heavy sandbox execution.
//!
//! Sandbox renders are CPU-bound and must not monopolize the async runtime.
//! Each execution takes a semaphore permit and runs on the blocking thread
//! pool; callers beyond the bound queue on the semaphore, which gives the
//! system backpressure instead of unbounded pile-up.

use crate::core::PagewrightError;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Semaphore-bounded executor for blocking tasks.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    /// Create a pool allowing `workers` concurrent executions.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Run a blocking task once a permit is available.
    pub async fn run<T, F>(&self, task: F) -> Result<T, PagewrightError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit =
            self.permits.clone().acquire_owned().await.map_err(|_| PagewrightError::Other {
                message: "worker pool is closed".to_string(),
            })?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        });

        handle.await.map_err(|err| PagewrightError::Other {
            message: format!("worker task failed: {err}"),
        })
    }

    /// Permits currently available.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
