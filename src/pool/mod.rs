//! A bounded pool of reusable [`Connection`]s.
//!
//! Opening a fresh SQLite connection for every request would be wasteful
//! and would defeat the whole point of serializing access through a fixed
//! set of workers. The pool hands out existing connections when it can,
//! creates new ones up to `pool.max_size`, and runs a low-frequency
//! background sweep that retires connections that have aged out, gone
//! idle too long, or been used too many times.

mod inner;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use self::inner::PoolInner;
use crate::config::Config;
use crate::connection::Connection;
use crate::error::Result;
use crate::stats::PoolStats;

/// How often the idle-sweep background task wakes up to check for expired
/// connections. Independent of any config knob — it only needs to be
/// frequent relative to the shortest configured `max_idle_time`/`pool_recycle`,
/// not driven by them directly.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

pub(crate) struct Pool {
    inner: Arc<PoolInner>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl Pool {
    /// Builds the pool and pre-populates it to `pool.min_size`.
    pub(crate) async fn new(config: Arc<Config>) -> Result<Self> {
        let inner = PoolInner::new_arc(config);
        inner.fill_to_min_size().await?;

        let sweep_inner = Arc::clone(&inner);
        let sweep_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                        if sweep_inner.is_closed() {
                            return;
                        }
                        sweep_inner.sweep_idle();
                    }
                    _ = sweep_inner.close_event() => return,
                }
            }
        });

        Ok(Pool {
            inner,
            sweep_task: Mutex::new(Some(sweep_task)),
        })
    }

    pub(crate) async fn acquire(&self) -> Result<Connection> {
        self.inner.acquire().await
    }

    pub(crate) fn release(&self, conn: Connection) {
        self.inner.release(conn);
    }

    pub(crate) fn discard(&self, conn: Connection) {
        self.inner.discard(conn);
    }

    pub(crate) fn size(&self) -> u32 {
        self.inner.size()
    }

    pub(crate) fn num_idle(&self) -> usize {
        self.inner.num_idle()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub(crate) fn stats(&self) -> PoolStats {
        self.inner.stats()
    }

    /// Whether `pool.echo` is set, so a pinned-connection handle can log
    /// dispatched SQL the same way the scheduler's own `maybe_echo` does.
    pub(crate) fn echo(&self) -> bool {
        self.inner.config.pool.echo
    }

    pub(crate) async fn close(&self) {
        self.inner.close().await;
        if let Some(task) = self.sweep_task.lock().expect("sweep task mutex poisoned").take() {
            task.abort();
        }
    }
}
