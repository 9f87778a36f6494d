use std::result::Result as StdResult;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::timeout;

use crate::config::Config;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::stats::PoolStats;

/// Shared pool state: the idle queue, the size-limiting semaphore, and the
/// bookkeeping counters `stats()` reports.
///
/// The semaphore's permits track "in-use" slots, not total size: a permit is
/// forgotten whenever a connection moves into checked-out state (whether
/// reused from idle or newly created) and returned whenever it moves back
/// out (to idle or to closed). Total connection count is tracked separately
/// by `size`, capped against `pool.max_size` only at creation time.
pub(crate) struct PoolInner {
    idle_conns: ArrayQueue<Connection>,
    semaphore: Semaphore,
    size: AtomicU32,
    num_idle: AtomicUsize,
    created_total: AtomicU64,
    closed_total: AtomicU64,
    waiters: AtomicUsize,
    is_closed: AtomicBool,
    on_closed: event_listener::Event,
    pub(crate) config: Arc<Config>,
}

impl PoolInner {
    pub(crate) fn new_arc(config: Arc<Config>) -> Arc<Self> {
        let max_size = config.pool.max_size as usize;
        Arc::new(PoolInner {
            idle_conns: ArrayQueue::new(max_size),
            semaphore: Semaphore::new(max_size),
            size: AtomicU32::new(0),
            num_idle: AtomicUsize::new(0),
            created_total: AtomicU64::new(0),
            closed_total: AtomicU64::new(0),
            waiters: AtomicUsize::new(0),
            is_closed: AtomicBool::new(false),
            on_closed: event_listener::Event::new(),
            config,
        })
    }

    pub(crate) fn size(&self) -> u32 {
        self.size.load(Ordering::Acquire)
    }

    pub(crate) fn num_idle(&self) -> usize {
        self.num_idle.load(Ordering::Acquire)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::Acquire)
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let size = self.size();
        let available = self.num_idle() as u32;
        PoolStats {
            size,
            in_use: size.saturating_sub(available),
            available,
            created_total: self.created_total.load(Ordering::Relaxed),
            closed_total: self.closed_total.load(Ordering::Relaxed),
            waiters: self.waiters.load(Ordering::Relaxed) as u32,
        }
    }

    /// Pre-populates `min_size` connections synchronously, as required at
    /// `Client::connect()` time.
    pub(crate) async fn fill_to_min_size(self: &Arc<Self>) -> Result<()> {
        for _ in 0..self.config.pool.min_size {
            let conn = self.acquire().await?;
            self.release(conn);
        }
        Ok(())
    }

    async fn open_connection(self: &Arc<Self>, guard: DecrementSizeGuard) -> Result<Connection> {
        match Connection::open(&self.config).await {
            Ok(conn) => {
                self.created_total.fetch_add(1, Ordering::Relaxed);
                guard.cancel();
                Ok(conn)
            }
            Err(e) => Err(e),
        }
    }

    /// Acquire a connection, waiting up to `pool.connection_timeout`.
    pub(crate) async fn acquire(self: &Arc<Self>) -> Result<Connection> {
        if self.is_closed() {
            return Err(Error::Shutdown);
        }

        let wait = self.config.connection_timeout();
        self.waiters.fetch_add(1, Ordering::Relaxed);
        let result = timeout(wait, self.acquire_inner()).await;
        self.waiters.fetch_sub(1, Ordering::Relaxed);

        result.map_err(|_| Error::PoolExhausted(wait))?
    }

    async fn acquire_inner(self: &Arc<Self>) -> Result<Connection> {
        loop {
            if self.is_closed() {
                return Err(Error::Shutdown);
            }

            let permit = tokio::select! {
                permit = self.semaphore.acquire() => permit.map_err(|_| Error::Shutdown)?,
                _ = self.close_event() => return Err(Error::Shutdown),
            };

            if let Some(conn) = self.try_pop_idle() {
                permit.forget();
                return Ok(conn);
            }

            match self.try_increment_size(permit) {
                Ok(guard) => return self.open_connection(guard).await,
                Err(_permit) => {
                    // No idle connection was available and size is already
                    // at max; either another acquirer just took the idle
                    // connection we both saw, or we raced a size change.
                    // The permit drops (and is returned) here; retry.
                    tracing::debug!("woke but found no connection to take; retrying");
                    tokio::task::yield_now().await;
                    continue;
                }
            }
        }
    }

    /// Pops a usable idle connection, discarding any that fail the recycle
    /// check along the way. Idle connections hold no semaphore permit, so
    /// discarding one only adjusts `size`.
    fn try_pop_idle(&self) -> Option<Connection> {
        while let Some(conn) = self.idle_conns.pop() {
            self.num_idle.fetch_sub(1, Ordering::AcqRel);
            if self.should_recycle(&conn) {
                self.size.fetch_sub(1, Ordering::AcqRel);
                self.closed_total.fetch_add(1, Ordering::Relaxed);
                tokio::spawn(conn.close());
                continue;
            }
            return Some(conn);
        }
        None
    }

    fn should_recycle(&self, conn: &Connection) -> bool {
        if !conn.healthy {
            return true;
        }
        if let Some(recycle) = self.config.pool_recycle() {
            if conn.age() >= recycle {
                return true;
            }
        }
        if self.size() > self.config.pool.min_size && conn.idle_time() >= self.config.max_idle_time()
        {
            return true;
        }
        if self.config.pool.max_queries > 0 && conn.use_count >= self.config.pool.max_queries {
            return true;
        }
        false
    }

    fn try_increment_size<'a>(
        self: &'a Arc<Self>,
        permit: SemaphorePermit<'a>,
    ) -> StdResult<DecrementSizeGuard, SemaphorePermit<'a>> {
        match self
            .size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |size| {
                if self.is_closed() {
                    return None;
                }
                size.checked_add(1)
                    .filter(|size| *size <= self.config.pool.max_size)
            }) {
            Ok(_) => {
                permit.forget();
                Ok(DecrementSizeGuard {
                    pool: Arc::clone(self),
                    cancelled: false,
                })
            }
            Err(_) => Err(permit),
        }
    }

    /// Returns a checked-out connection: to the idle queue if it's still
    /// healthy and under its recycle limits, otherwise closes it. Either
    /// way its in-use permit is returned.
    pub(crate) fn release(self: &Arc<Self>, conn: Connection) {
        if self.is_closed() || self.should_recycle(&conn) {
            self.size.fetch_sub(1, Ordering::AcqRel);
            self.closed_total.fetch_add(1, Ordering::Relaxed);
            self.semaphore.add_permits(1);
            tokio::spawn(conn.close());
            return;
        }

        if self.idle_conns.push(conn).is_err() {
            panic!("BUG: idle connection queue overflow");
        }
        self.num_idle.fetch_add(1, Ordering::AcqRel);
        self.semaphore.add_permits(1);
    }

    /// Discards a checked-out connection outright, e.g. after a fatal
    /// driver error. Like `release`, always returns its in-use permit.
    pub(crate) fn discard(&self, conn: Connection) {
        self.size.fetch_sub(1, Ordering::AcqRel);
        self.closed_total.fetch_add(1, Ordering::Relaxed);
        self.semaphore.add_permits(1);
        tokio::spawn(conn.close());
    }

    /// Sweeps the idle queue for expired connections without touching
    /// in-use connections or dropping below `min_size`.
    pub(crate) fn sweep_idle(self: &Arc<Self>) {
        let mut kept = Vec::new();
        while let Some(conn) = self.idle_conns.pop() {
            self.num_idle.fetch_sub(1, Ordering::AcqRel);
            if self.size() > self.config.pool.min_size && self.should_recycle(&conn) {
                self.size.fetch_sub(1, Ordering::AcqRel);
                self.closed_total.fetch_add(1, Ordering::Relaxed);
                tokio::spawn(conn.close());
            } else {
                kept.push(conn);
            }
        }
        for conn in kept {
            self.num_idle.fetch_add(1, Ordering::AcqRel);
            let _ = self.idle_conns.push(conn);
        }
    }

    fn mark_closed(&self) {
        self.is_closed.store(true, Ordering::Release);
        self.on_closed.notify(usize::MAX);
    }

    pub(crate) fn close_event(&self) -> impl std::future::Future<Output = ()> + '_ {
        let listener = (!self.is_closed()).then(|| self.on_closed.listen());
        async move {
            if let Some(listener) = listener {
                listener.await;
            }
        }
    }

    /// Closes the pool: marks it closed (cancelling waiters), then drains
    /// and closes every idle connection.
    pub(crate) async fn close(self: &Arc<Self>) {
        self.mark_closed();
        while let Some(conn) = self.idle_conns.pop() {
            self.num_idle.fetch_sub(1, Ordering::AcqRel);
            self.closed_total.fetch_add(1, Ordering::Relaxed);
            conn.close().await;
        }
    }
}

/// RAII guard that decrements the pool's size counter and returns the
/// in-use permit if dropped before `cancel()` is called, so a connection
/// attempt that fails doesn't leak an accounted-for slot.
pub(crate) struct DecrementSizeGuard {
    pool: Arc<PoolInner>,
    cancelled: bool,
}

impl DecrementSizeGuard {
    pub(crate) fn cancel(mut self) {
        self.cancelled = true;
    }
}

impl Drop for DecrementSizeGuard {
    fn drop(&mut self) {
        if !self.cancelled {
            self.pool.size.fetch_sub(1, Ordering::AcqRel);
            self.pool.semaphore.add_permits(1);
        }
    }
}
