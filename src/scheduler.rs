use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Caps the number of transcriptions in flight. Jobs beyond the pool size
/// wait in FIFO order for a permit.
#[derive(Debug, Clone)]
pub struct Scheduler {
    permits: Arc<Semaphore>,
    pool_size: usize,
}

impl Scheduler {
    pub fn new(pool_size: usize) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(pool_size)),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs `job` once a permit is free; the permit is held until it finishes.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .with_context(|| "scheduler is closed")?;
        Ok(job.await)
    }
}
