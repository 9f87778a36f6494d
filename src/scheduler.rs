//! The priority-scheduled executor: a fixed pool of worker tasks that pull
//! [`Request`]s in priority order and run them against pooled connections.
//!
//! Named `Scheduler` rather than `Executor` in code: this crate's driver
//! bridge already uses `Executor` for the trait that runs a request on a
//! single connection, and the two concepts would otherwise collide.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::priority::Priority;
use crate::queue::PriorityQueue;
use crate::request::{Deadline, Request, RequestKind};
use crate::sqlite::Outcome;
use crate::stats::SchedulerStats;

pub(crate) struct Scheduler {
    queue: Arc<PriorityQueue>,
    pool: Arc<Pool>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    active_workers: AtomicUsize,
    total_executed: AtomicU64,
    total_failed: AtomicU64,
    total_timed_out: AtomicU64,
}

impl Scheduler {
    /// Starts `worker_count` worker tasks pulling from a fresh queue.
    pub(crate) fn start(pool: Arc<Pool>, worker_count: usize) -> Arc<Self> {
        let scheduler = Arc::new(Scheduler {
            queue: Arc::new(PriorityQueue::new()),
            pool,
            workers: std::sync::Mutex::new(Vec::with_capacity(worker_count)),
            worker_count,
            active_workers: AtomicUsize::new(0),
            total_executed: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
            total_timed_out: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let worker = Arc::clone(&scheduler);
            workers.push(tokio::spawn(async move { worker.worker_loop().await }));
        }
        *scheduler.workers.lock().expect("workers mutex poisoned") = workers;

        scheduler
    }

    /// Places a request on the queue and waits for its outcome.
    ///
    /// Fails immediately with `Shutdown` if the scheduler has already been
    /// asked to close, without ever touching the Pool.
    pub(crate) async fn submit(
        &self,
        kind: RequestKind,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> Result<Outcome> {
        let deadline = Deadline::from_timeout(timeout);
        if deadline.is_expired() {
            return Err(Error::Timeout(Duration::ZERO));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request {
            seq: self.queue.next_seq(),
            priority,
            kind,
            deadline,
            reply: reply_tx,
        };
        self.queue.push(request);

        reply_rx.await.map_err(|_| Error::Shutdown)?
    }

    pub(crate) fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queue_size: self.queue.len(),
            workers: self.worker_count,
            active_workers: self.active_workers.load(Ordering::Relaxed),
            total_executed: self.total_executed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            total_timed_out: self.total_timed_out.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting new dispatches, wakes every worker, and waits for
    /// them to drain.
    ///
    /// `queue.close()` itself fails every request already pending (or that
    /// loses a race with this call) with `Shutdown` — see
    /// [`PriorityQueue::close`](crate::queue::PriorityQueue::close) — so
    /// there is nothing left to drain once the workers have exited.
    pub(crate) async fn close(&self) {
        self.queue.close();

        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.workers.lock().expect("workers mutex poisoned"));
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn worker_loop(self: Arc<Self>) {
        while let Some(request) = self.queue.pop_highest().await {
            self.active_workers.fetch_add(1, Ordering::AcqRel);
            self.run_request(request).await;
            self.active_workers.fetch_sub(1, Ordering::AcqRel);
        }
    }

    async fn run_request(&self, request: Request) {
        let Request {
            kind,
            deadline,
            reply,
            ..
        } = request;

        if deadline.is_expired() {
            self.total_timed_out.fetch_add(1, Ordering::Relaxed);
            let _ = reply.send(Err(Error::Timeout(Duration::ZERO)));
            return;
        }

        let remaining = match deadline.remaining() {
            Ok(remaining) => remaining,
            Err(e) => {
                self.total_timed_out.fetch_add(1, Ordering::Relaxed);
                let _ = reply.send(Err(e));
                return;
            }
        };

        let acquired = match remaining {
            Some(remaining) => tokio::time::timeout(remaining, self.pool.acquire()).await,
            None => Ok(self.pool.acquire().await),
        };

        let mut conn = match acquired {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                self.record_failure(&e);
                let _ = reply.send(Err(e));
                return;
            }
            Err(_) => {
                self.total_timed_out.fetch_add(1, Ordering::Relaxed);
                let _ = reply.send(Err(Error::Timeout(remaining.unwrap_or(Duration::ZERO))));
                return;
            }
        };

        let remaining = match deadline.remaining() {
            Ok(remaining) => remaining,
            Err(e) => {
                self.total_timed_out.fetch_add(1, Ordering::Relaxed);
                self.pool.release(conn);
                let _ = reply.send(Err(e));
                return;
            }
        };

        let outcome = match remaining {
            Some(remaining) => tokio::time::timeout(remaining, conn.run(kind)).await,
            None => Ok(conn.run(kind).await),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                self.total_timed_out.fetch_add(1, Ordering::Relaxed);
                // The driver call may still be running on the connection's
                // worker thread; we no longer know its state, so discard
                // rather than risk handing a confused connection back out.
                self.pool.discard(conn);
                let _ = reply.send(Err(Error::Timeout(remaining.unwrap_or(Duration::ZERO))));
                return;
            }
        };

        if conn.healthy {
            self.pool.release(conn);
        } else {
            self.pool.discard(conn);
        }

        match &result {
            Ok(_) => {
                self.total_executed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.record_failure(e),
        }
        let _ = reply.send(result);
    }

    fn record_failure(&self, error: &Error) {
        if matches!(error, Error::Timeout(_)) {
            self.total_timed_out.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
