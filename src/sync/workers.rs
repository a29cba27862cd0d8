// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Task-execution contexts for the sync pipeline.
//!
//! [`PersistPool`] bounds how many persist tasks may run at once and how many
//! may wait for a slot. It is shared by every run of one engine.
//!
//! [`SyncWorkers`] is the per-run scope: every task a run spawns is tracked
//! here, and dropping the scope aborts whatever is still outstanding, so an
//! early return, error or cancelled caller never leaks the producer, the
//! fetch worker or a queued persist task.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use crate::metrics;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Persist pool saturated ({max_tasks} running, {max_queued} queued)")]
    Saturated { max_tasks: usize, max_queued: usize },
    #[error("Worker task failed: {0}")]
    Join(String),
}

/// Bounded pool for store-bound work.
#[derive(Debug, Clone)]
pub struct PersistPool {
    slots: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_tasks: usize,
    max_queued: usize,
}

impl PersistPool {
    pub fn new(max_tasks: usize, max_queued: usize) -> Self {
        let max_tasks = max_tasks.max(1);
        Self {
            slots: Arc::new(Semaphore::new(max_tasks)),
            queued: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            max_tasks,
            max_queued,
        }
    }

    /// Tasks currently holding a slot.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Tasks waiting for a slot.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    fn spawn<F>(&self, fut: F) -> Result<JoinHandle<F::Output>, WorkerError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let slots = Arc::clone(&self.slots);
        let active = Arc::clone(&self.active);

        // Fast path: a slot is free now
        if let Ok(permit) = Arc::clone(&slots).try_acquire_owned() {
            return Ok(tokio::spawn(async move {
                let _permit = permit;
                let _active = ActiveGuard::enter(active);
                fut.await
            }));
        }

        // Reserve a queue position or fail fast
        let reserved = self
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |q| {
                (q < self.max_queued).then_some(q + 1)
            })
            .is_ok();
        if !reserved {
            metrics::record_pool_rejection();
            warn!(
                max_tasks = self.max_tasks,
                max_queued = self.max_queued,
                "Persist pool saturated, rejecting task"
            );
            return Err(WorkerError::Saturated {
                max_tasks: self.max_tasks,
                max_queued: self.max_queued,
            });
        }

        let queued = QueueGuard(Arc::clone(&self.queued));
        Ok(tokio::spawn(async move {
            let permit = slots.acquire_owned().await;
            drop(queued);
            let _permit = permit;
            let _active = ActiveGuard::enter(active);
            fut.await
        }))
    }
}

/// Releases a queue position even if the waiting task is aborted.
struct QueueGuard(Arc<AtomicUsize>);

impl Drop for QueueGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(active: Arc<AtomicUsize>) -> Self {
        let now = active.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::set_pool_active(now);
        Self(active)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let now = self.0.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::set_pool_active(now);
    }
}

/// Scoped owner of every task spawned by one sync run.
pub struct SyncWorkers {
    pool: PersistPool,
    handles: Vec<AbortHandle>,
}

impl SyncWorkers {
    pub fn new(pool: PersistPool) -> Self {
        Self { pool, handles: Vec::new() }
    }

    /// Spawn a fetch-side task (producer or fetch worker).
    pub fn spawn_fetch<F>(&mut self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = tokio::spawn(fut);
        self.handles.push(handle.abort_handle());
        handle
    }

    /// Submit a task to the persist pool.
    pub fn submit_persist<F>(&mut self, fut: F) -> Result<JoinHandle<F::Output>, WorkerError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = self.pool.spawn(fut)?;
        self.handles.push(handle.abort_handle());
        Ok(handle)
    }
}

impl Drop for SyncWorkers {
    fn drop(&mut self) {
        let outstanding = self.handles.iter().filter(|h| !h.is_finished()).count();
        for handle in &self.handles {
            handle.abort();
        }
        if outstanding > 0 {
            debug!(outstanding, "Aborted outstanding sync tasks");
        }
    }
}

/// Await a worker task, mapping panics and cancellation.
pub async fn join<T>(handle: JoinHandle<T>) -> Result<T, WorkerError> {
    handle.await.map_err(|e| WorkerError::Join(e.to_string()))
}
