//! Bounded worker pool for running independent work concurrently

use crate::config::ExecutionConfig;
use rayon::prelude::*;
use std::fmt;

#[derive(Debug, thiserror::Error)]
#[error("failed to start worker pool: {0}")]
pub struct PoolError(#[from] rayon::ThreadPoolBuildError);

/// Fixed-size pool of worker threads
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    /// Start a pool with `threads` workers (0 = one per CPU)
    pub fn new(threads: usize) -> Result<Self, PoolError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("kiln-worker-{i}"))
            .build()?;
        Ok(WorkerPool { pool })
    }

    pub fn from_config(config: &ExecutionConfig) -> Result<Self, PoolError> {
        Self::new(config.worker_threads)
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `f` on every item, blocking until all have finished
    pub fn for_each<T, F>(&self, items: &[T], f: F)
    where
        T: Sync,
        F: Fn(&T) + Send + Sync,
    {
        self.pool.install(|| items.par_iter().for_each(f));
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads())
            .finish()
    }
}
