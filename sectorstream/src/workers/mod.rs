//! Fixed pool of decode workers.
//!
//! Decoding is CPU-bound and must stay off the async runtime, so the pool
//! runs dedicated OS threads. Dispatch is deliberately simple: each job goes
//! to the worker with the fewest in-flight jobs at dispatch time, with ties
//! won by the earliest-spawned worker. There is no work stealing, migration
//! or priority lane.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// Pool bounds mandated by the streaming design: enough parallelism to keep
/// fetches fed, small enough not to starve the host renderer.
const MIN_WORKERS: usize = 2;
const MAX_WORKERS: usize = 4;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker-pool failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    ShutDown,
    #[error("worker exited before returning a result")]
    WorkerGone,
}

struct Worker {
    sender: mpsc::UnboundedSender<Job>,
    in_flight: Arc<AtomicUsize>,
}

/// Fixed-size pool of decode threads with least-loaded dispatch.
pub struct WorkerPool {
    workers: RwLock<Vec<Worker>>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

/// Pool size for this machine: available parallelism clamped to `[2, 4]`.
pub fn default_pool_size() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_WORKERS)
        .clamp(MIN_WORKERS, MAX_WORKERS)
}

impl WorkerPool {
    /// Spawn a pool sized by [`default_pool_size`].
    pub fn new() -> Self {
        Self::with_size(default_pool_size())
    }

    /// Spawn a pool with an explicit worker count (clamped to at least one).
    pub fn with_size(size: usize) -> Self {
        let size = size.max(1);
        let mut workers = Vec::with_capacity(size);
        let mut handles = Vec::with_capacity(size);

        for index in 0..size {
            let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
            let in_flight = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&in_flight);

            let handle = thread::Builder::new()
                .name(format!("sector-decode-{index}"))
                .spawn(move || {
                    while let Some(job) = receiver.blocking_recv() {
                        job();
                        counter.fetch_sub(1, Ordering::SeqCst);
                    }
                })
                .expect("failed to spawn decode worker thread");

            workers.push(Worker { sender, in_flight });
            handles.push(handle);
        }

        debug!(workers = size, "decode worker pool started");
        Self {
            workers: RwLock::new(workers),
            handles: Mutex::new(handles),
        }
    }

    /// Number of workers, zero after shutdown.
    pub fn size(&self) -> usize {
        self.workers.read().len()
    }

    /// Current in-flight count per worker, in spawn order.
    pub fn in_flight_counts(&self) -> Vec<usize> {
        self.workers
            .read()
            .iter()
            .map(|w| w.in_flight.load(Ordering::SeqCst))
            .collect()
    }

    /// Run `work` on the least-loaded worker and await its result.
    ///
    /// The in-flight count is incremented at dispatch and decremented when
    /// the job finishes, so queued jobs count toward load.
    pub async fn post_work<T, F>(&self, work: F) -> Result<T, PoolError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();

        {
            let workers = self.workers.read();
            let worker = workers
                .iter()
                .min_by_key(|w| w.in_flight.load(Ordering::SeqCst))
                .ok_or(PoolError::ShutDown)?;

            worker.in_flight.fetch_add(1, Ordering::SeqCst);
            trace!(
                in_flight = worker.in_flight.load(Ordering::SeqCst),
                "dispatching decode job"
            );

            let job: Job = Box::new(move || {
                let _ = result_tx.send(work());
            });
            if worker.sender.send(job).is_err() {
                worker.in_flight.fetch_sub(1, Ordering::SeqCst);
                return Err(PoolError::ShutDown);
            }
        }

        result_rx.await.map_err(|_| PoolError::WorkerGone)
    }

    /// Close the job channels, drain queued work and join the threads.
    ///
    /// Idempotent; later `post_work` calls fail with [`PoolError::ShutDown`].
    pub fn shutdown(&self) {
        let workers = std::mem::take(&mut *self.workers.write());
        drop(workers);

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.join();
        }
        debug!("decode worker pool shut down");
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Detach rather than join: dropping the senders lets workers drain
        // and exit on their own. Explicit shutdown() joins.
        self.workers.get_mut().clear();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size())
            .field("in_flight", &self.in_flight_counts())
            .finish()
    }
}
