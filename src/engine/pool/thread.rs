//! Fixed-size thread pool implementation.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use super::error::{PoolError, PoolResult};
use super::PoolStats;

/// A request wrapper with an optional response channel.
struct WorkerRequest<Req, Res> {
    request: Req,
    /// `None` for fire-and-forget jobs.
    response_tx: Option<oneshot::Sender<PoolResult<Res>>>,
    queued_at: Instant,
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    rejected: AtomicU64,
    panics: AtomicU64,
}

/// A fixed-size pool of named OS threads.
///
/// Workers pull requests from a shared bounded queue and run them through a
/// handler. Threads are named `<name>-<id>`, which is what lifecycle events
/// report as the producing thread.
pub struct ThreadPool<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    /// Channel to send requests to workers; taken on shutdown.
    request_tx: Mutex<Option<mpsc::SyncSender<WorkerRequest<Req, Res>>>>,
    /// Worker thread handles.
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    queue_capacity: usize,
    /// Current pending request count.
    pending: Arc<AtomicUsize>,
    counters: Arc<Counters>,
    shutdown: AtomicBool,
    /// Pool name for logging and thread names.
    name: String,
}

impl<Req, Res> ThreadPool<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    /// Create a new thread pool with custom queue capacity.
    pub fn with_capacity<F>(
        num_workers: usize,
        queue_capacity: usize,
        name: impl Into<String>,
        handler: F,
    ) -> io::Result<Self>
    where
        F: Fn(Req) -> Res + Send + Sync + Clone + 'static,
    {
        let name = name.into();
        let (request_tx, request_rx) = mpsc::sync_channel::<WorkerRequest<Req, Res>>(queue_capacity);
        let request_rx = Arc::new(Mutex::new(request_rx));
        let pending = Arc::new(AtomicUsize::new(0));
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(num_workers);

        for id in 0..num_workers {
            let rx = Arc::clone(&request_rx);
            let handler = handler.clone();
            let pending = Arc::clone(&pending);
            let counters = Arc::clone(&counters);

            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, id))
                .spawn(move || {
                    Self::worker_loop(id, rx, handler, pending, counters);
                })?;

            workers.push(handle);
        }

        tracing::info!(
            pool = %name,
            workers = num_workers,
            capacity = queue_capacity,
            "thread pool created"
        );

        Ok(Self {
            request_tx: Mutex::new(Some(request_tx)),
            workers: Mutex::new(workers),
            worker_count: num_workers,
            queue_capacity,
            pending,
            counters,
            shutdown: AtomicBool::new(false),
            name,
        })
    }

    /// Worker thread main loop.
    fn worker_loop<F>(
        id: usize,
        rx: Arc<Mutex<mpsc::Receiver<WorkerRequest<Req, Res>>>>,
        handler: F,
        pending: Arc<AtomicUsize>,
        counters: Arc<Counters>,
    ) where
        F: Fn(Req) -> Res,
    {
        tracing::debug!(worker = id, "worker started");

        loop {
            let work = {
                let guard = rx.lock().unwrap_or_else(PoisonError::into_inner);
                guard.recv()
            };

            let Ok(WorkerRequest {
                request,
                response_tx,
                queued_at,
            }) = work
            else {
                // Channel closed, shutdown
                break;
            };

            pending.fetch_sub(1, Ordering::SeqCst);
            counters.total.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(
                worker = id,
                queue_wait_us = queued_at.elapsed().as_micros() as u64,
                "request dequeued"
            );

            let result = panic::catch_unwind(AssertUnwindSafe(|| handler(request)))
                .map_err(|payload| {
                    counters.panics.fetch_add(1, Ordering::Relaxed);
                    let msg = panic_message(payload.as_ref());
                    tracing::error!(worker = id, error = %msg, "handler panicked");
                    PoolError::WorkerPanic(msg)
                });

            if let Some(tx) = response_tx {
                let _ = tx.send(result);
            }
        }

        tracing::debug!(worker = id, "worker stopped");
    }

    fn enqueue(
        &self,
        request: Req,
        response_tx: Option<oneshot::Sender<PoolResult<Res>>>,
    ) -> PoolResult<()> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(PoolError::Shutdown);
        }

        let sender = self.request_tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return Err(PoolError::Shutdown);
        };

        self.pending.fetch_add(1, Ordering::SeqCst);

        let work = WorkerRequest {
            request,
            response_tx,
            queued_at: Instant::now(),
        };

        // Use try_send to detect queue full
        if let Err(e) = sender.try_send(work) {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return match e {
                mpsc::TrySendError::Full(_) => {
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    Err(PoolError::QueueFull {
                        capacity: self.queue_capacity,
                        pending: self.pending.load(Ordering::SeqCst),
                    })
                }
                mpsc::TrySendError::Disconnected(_) => Err(PoolError::Shutdown),
            };
        }
        Ok(())
    }

    /// Queue a job without waiting for its result.
    pub fn submit(&self, request: Req) -> PoolResult<()> {
        self.enqueue(request, None)
    }

    /// Execute a request on the pool.
    pub async fn execute(&self, request: Req) -> PoolResult<Res> {
        let (response_tx, response_rx) = oneshot::channel();
        self.enqueue(request, Some(response_tx))?;

        match response_rx.await {
            Ok(result) => result,
            Err(_) => Err(PoolError::ChannelClosed),
        }
    }

    /// Execute a request with timeout.
    pub async fn execute_with_timeout(&self, request: Req, timeout: Duration) -> PoolResult<Res> {
        let (response_tx, response_rx) = oneshot::channel();
        self.enqueue(request, Some(response_tx))?;

        match tokio::time::timeout(timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PoolError::ChannelClosed),
            Err(_) => Err(PoolError::Timeout(timeout)),
        }
    }

    /// Get the number of workers.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Get the queue capacity.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Get the pool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_requests: self.counters.total.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            panics: self.counters.panics.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting work. Workers exit once the queue is drained.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return; // Already shutting down
        }

        tracing::info!(pool = %self.name, "shutting down thread pool");

        // Dropping the sender makes recv() fail once the queue is empty
        self.request_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Wait for all workers to finish (call after shutdown).
    pub fn join(&self) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for worker in workers.drain(..) {
            if worker.thread().id() == thread::current().id() {
                // Joining ourselves would deadlock
                continue;
            }
            let _ = worker.join();
        }
    }
}

impl<Req, Res> Drop for ThreadPool<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
