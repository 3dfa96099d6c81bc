//! Worker pool draining a submission queue into a result queue.
//!
//! Workers share one submission receiver. Each takes a request, dispatches
//! it and pushes exactly one [`Response`] to the result queue, whatever the
//! outcome. Results arrive in completion order, not submission order;
//! callers correlate them by `request_id`.
//!
//! Shutdown is broadcast on a `watch` channel. Workers stop taking new
//! requests as soon as they see it but finish the one in hand.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::dispatcher::dispatch_or_synthesize;
use crate::error::{Error, Result};
use crate::request::BuiltRequest;
use crate::response::Response;

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker tasks.
    ///
    /// Default: 100
    pub workers: usize,
    /// Capacity of the submission and result queues.
    ///
    /// Default: 1
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 100,
            queue_capacity: 1,
        }
    }
}

impl PoolConfig {
    /// Set the number of workers (at least one).
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set queue capacity (at least one).
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

type JobQueue = Arc<Mutex<mpsc::Receiver<BuiltRequest>>>;

/// Running worker pool. Dropped or [`close`](Self::close)d to stop.
pub struct WorkerPool {
    jobs: mpsc::Sender<BuiltRequest>,
    results: Mutex<mpsc::Receiver<Response>>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn the workers. Must be called from within a Tokio runtime.
    pub fn start(config: PoolConfig) -> Self {
        let workers = config.workers.max(1);
        let capacity = config.queue_capacity.max(1);

        let (jobs_tx, jobs_rx) = mpsc::channel(capacity);
        let (results_tx, results_rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let jobs_rx: JobQueue = Arc::new(Mutex::new(jobs_rx));

        let handles = (0..workers)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&jobs_rx),
                    results_tx.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        tracing::info!(workers, queue_capacity = capacity, "Worker pool started");

        Self {
            jobs: jobs_tx,
            results: Mutex::new(results_rx),
            shutdown: shutdown_tx,
            handles,
        }
    }

    /// Enqueue a request. Waits while the queue is full.
    pub async fn submit(&self, request: BuiltRequest) -> Result<()> {
        self.jobs.send(request).await.map_err(|_| Error::PoolClosed)
    }

    /// Next completed response. `None` once every worker has exited and the queue is drained.
    pub async fn recv(&self) -> Option<Response> {
        self.results.lock().await.recv().await
    }

    /// Stop the workers and wait for them.
    ///
    /// Requests already being dispatched run to completion; their results
    /// are discarded. Queued requests are not started.
    pub async fn close(self) {
        let Self {
            jobs,
            results,
            shutdown,
            handles,
        } = self;

        let _ = shutdown.send(true);
        drop(jobs);
        // Unblocks workers waiting to hand over a result.
        drop(results);

        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Worker task ended abnormally");
            }
        }
        tracing::info!(workers = count, "Worker pool stopped");
    }
}

async fn worker_loop(
    worker: usize,
    jobs: JobQueue,
    results: mpsc::Sender<Response>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.changed() => None,
            job = async { jobs.lock().await.recv().await } => job,
        };
        let Some(request) = next else {
            break;
        };

        let id = request.id.clone();
        tracing::debug!(worker, request_id = %id, "Dispatching queued request");
        let response = dispatch_or_synthesize(request).await;
        if results.send(response).await.is_err() {
            tracing::debug!(worker, request_id = %id, "Result queue closed, dropping response");
            break;
        }
    }
    tracing::debug!(worker, "Worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_floor() {
        let config = PoolConfig::default();
        assert_eq!(config.workers, 100);
        assert_eq!(config.queue_capacity, 1);

        let config = PoolConfig::default().workers(0).queue_capacity(0);
        assert_eq!(config.workers, 1);
        assert_eq!(config.queue_capacity, 1);
    }

    #[tokio::test]
    async fn test_close_idle_pool() {
        let pool = WorkerPool::start(PoolConfig::default().workers(4));
        tokio::time::timeout(std::time::Duration::from_secs(5), pool.close())
            .await
            .expect("idle pool should close promptly");
    }
}
