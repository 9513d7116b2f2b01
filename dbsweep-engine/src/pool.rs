//! Bounded worker pool for entity tasks.
//!
//! Submission never waits: the task is spawned straight away and acquires a
//! concurrency permit as its first step. Handles stay in a [`JoinSet`] until
//! [`WorkerPool::join_all`] drains them or [`WorkerPool::abort_all`] cancels
//! them.

use dbsweep_core::{SweepError, SweepResult};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// What one entity task reports when it finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub entity: String,
    /// Items checked inside the entity.
    pub targets: usize,
    /// Check evaluations performed across all targets.
    pub evaluations: usize,
}

/// Totals after draining the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub panicked: usize,
    pub tasks: Vec<TaskSummary>,
}

impl PoolSummary {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.cancelled + self.panicked
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cancelled == 0 && self.panicked == 0
    }
}

/// Fixed-size pool running entity tasks on the current tokio runtime.
#[derive(Debug)]
pub struct WorkerPool {
    size: usize,
    semaphore: Arc<Semaphore>,
    tasks: Mutex<JoinSet<SweepResult<TaskSummary>>>,
}

impl WorkerPool {
    /// Create a pool running at most `size` tasks at once (minimum 1).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            semaphore: Arc::new(Semaphore::new(size)),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Spawn `task`. Must be called from within a tokio runtime.
    pub fn submit<F>(&self, task: F)
    where
        F: Future<Output = SweepResult<TaskSummary>> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        self.lock().spawn(async move {
            let _permit = semaphore.acquire_owned().await.map_err(|e| SweepError::Task {
                reason: format!("worker pool closed: {}", e),
            })?;
            task.await
        });
    }

    /// Number of submitted tasks not yet collected by [`join_all`](Self::join_all).
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    /// Cancel every outstanding task.
    pub fn abort_all(&self) {
        let mut tasks = self.lock();
        tracing::warn!(outstanding = tasks.len(), "Aborting submitted tasks");
        tasks.abort_all();
    }

    /// Wait for every submitted task and tally the results.
    pub async fn join_all(&self) -> PoolSummary {
        let mut tasks = std::mem::take(&mut *self.lock());
        let mut summary = PoolSummary::default();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(task)) => {
                    summary.completed += 1;
                    summary.tasks.push(task);
                }
                Ok(Err(error)) => {
                    tracing::error!(error = %error, "Entity task failed");
                    summary.failed += 1;
                }
                Err(join_err) if join_err.is_cancelled() => summary.cancelled += 1,
                Err(join_err) => {
                    tracing::error!(error = %join_err, "Entity task panicked");
                    summary.panicked += 1;
                }
            }
        }

        summary
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<SweepResult<TaskSummary>>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
