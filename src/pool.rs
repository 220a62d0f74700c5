//! Bounded worker pool for blocking validator work
//!
//! Blocking checks run on tokio's blocking threads, but at most `size` of
//! them at once so a burst of heavy validations cannot starve the runtime.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::validation::ValidatorError;

/// Default number of concurrent blocking jobs
pub const DEFAULT_POOL_SIZE: usize = 4;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool running at most `size` jobs at once (minimum 1)
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of free slots right now
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run a blocking closure on the pool and wait for its result.
    ///
    /// The slot stays occupied until the closure returns, even if the caller
    /// stops waiting.
    pub async fn run<F, T>(&self, job: F) -> Result<T, ValidatorError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ValidatorError::PoolClosed)?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| ValidatorError::Panicked(e.to_string()))
    }

    /// Stop accepting new jobs; queued callers receive `PoolClosed`
    pub fn close(&self) {
        self.permits.close();
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}
