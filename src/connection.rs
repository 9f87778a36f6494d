//! A single pooled connection: identity, age, use count, and health.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::Result;
use crate::request::RequestKind;
use crate::sqlite::{ConnectionWorker, Outcome};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A thin wrapper around a driver handle, carrying the bookkeeping the Pool
/// needs to decide when to recycle it.
///
/// Concurrency is provided by running many of these side by side, never by
/// sharing one `Connection` across tasks — enforced by the Pool handing out
/// exactly one at a time, not by locking inside `Connection` itself.
pub struct Connection {
    pub(crate) id: u64,
    worker: ConnectionWorker,
    pub(crate) created_at: Instant,
    pub(crate) last_used_at: Instant,
    pub(crate) use_count: u64,
    pub(crate) healthy: bool,
}

impl Connection {
    pub(crate) async fn open(config: &Arc<Config>) -> Result<Self> {
        let worker = ConnectionWorker::establish(
            config.connection.database.clone(),
            config.connection.uri,
            config.busy_timeout(),
            config.cached_statements(),
        )
        .await?;
        let now = Instant::now();
        Ok(Connection {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            worker,
            created_at: now,
            last_used_at: now,
            use_count: 0,
            healthy: true,
        })
    }

    /// Runs one request against this connection.
    ///
    /// Marks the connection unhealthy on a failure so the Pool can discard
    /// it on release instead of returning it to service. The driver error
    /// itself is still propagated to the caller.
    pub(crate) async fn run(&mut self, kind: RequestKind) -> Result<Outcome> {
        self.use_count += 1;
        self.last_used_at = Instant::now();

        let result = match kind {
            RequestKind::Execute { sql, params } => self.worker.execute(sql, params).await,
            RequestKind::ExecuteMany { sql, param_sets } => {
                self.worker.execute_many(sql, param_sets).await
            }
            RequestKind::FetchOne { sql, params } => self.worker.fetch_one(sql, params).await,
            RequestKind::FetchAll { sql, params } => self.worker.fetch_all(sql, params).await,
            RequestKind::Raw { sql } => self.worker.execute_batch(sql).await,
            RequestKind::Begin { sql } => self.worker.begin(sql).await.map(|_| Outcome::Unit),
            RequestKind::Commit => self.worker.commit().await.map(|_| Outcome::Unit),
            RequestKind::Rollback => self.worker.rollback().await.map(|_| Outcome::Unit),
        };

        if let Err(ref err) = result {
            if err.is_connection_fatal() {
                self.healthy = false;
            }
        }
        result
    }

    /// Best-effort rollback for a connection released mid-transaction
    /// without an explicit commit or rollback (e.g. the scope was dropped).
    pub(crate) fn abandon_transaction(&mut self) {
        self.worker.start_rollback();
    }

    /// Issues a best-effort rollback, then returns the connection to `pool`
    /// (or discards it if unhealthy). Used when a [`TransactionScope`] is
    /// dropped without an explicit `commit`/`rollback`.
    ///
    /// [`TransactionScope`]: crate::client::TransactionScope
    pub(crate) fn abandon_transaction_and_release(mut self, pool: &crate::pool::Pool) {
        self.abandon_transaction();
        if self.healthy {
            pool.release(self);
        } else {
            pool.discard(self);
        }
    }

    pub(crate) async fn ping(&self) -> Result<()> {
        self.worker.ping().await
    }

    pub(crate) fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn idle_time(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    pub(crate) async fn close(mut self) {
        let _ = self.worker.shutdown().await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("use_count", &self.use_count)
            .field("healthy", &self.healthy)
            .finish()
    }
}
